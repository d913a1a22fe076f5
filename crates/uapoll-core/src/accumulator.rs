// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The outbound boundary of an input plugin.

use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::metric::{Fields, Metric, Tags};

// =============================================================================
// Accumulator
// =============================================================================

/// Receives finished measurements and cycle-level errors from an input.
///
/// Implementations must not block for long; they are called from inside the
/// collection cycle.
pub trait Accumulator: Send {
    /// Accepts one measurement.
    fn add_fields(&mut self, name: &str, tags: Tags, fields: Fields, timestamp: DateTime<Utc>);

    /// Accepts an error that failed a whole collection cycle.
    fn add_error(&mut self, error: &dyn Error);

    /// Accepts a pre-built metric.
    fn add_metric(&mut self, metric: Metric) {
        self.add_fields(&metric.name, metric.tags, metric.fields, metric.timestamp);
    }
}

/// A clonable handle to an accumulator shared across tasks.
pub type SharedAccumulator<A> = Arc<Mutex<A>>;

impl<A: Accumulator> Accumulator for Arc<Mutex<A>> {
    fn add_fields(&mut self, name: &str, tags: Tags, fields: Fields, timestamp: DateTime<Utc>) {
        self.lock().add_fields(name, tags, fields, timestamp);
    }

    fn add_error(&mut self, error: &dyn Error) {
        self.lock().add_error(error);
    }
}

// =============================================================================
// MemoryAccumulator
// =============================================================================

/// Accumulator that keeps everything in memory.
///
/// Used by `once` runs and by tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryAccumulator {
    metrics: Vec<Metric>,
    errors: Vec<String>,
}

impl MemoryAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all accepted metrics in arrival order.
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Returns the rendered messages of all accepted errors.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Returns the first metric with the given name.
    pub fn find(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Number of accepted metrics.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns `true` if no metric was accepted.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Drains accepted metrics.
    pub fn take_metrics(&mut self) -> Vec<Metric> {
        std::mem::take(&mut self.metrics)
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.metrics.clear();
        self.errors.clear();
    }
}

impl Accumulator for MemoryAccumulator {
    fn add_fields(&mut self, name: &str, tags: Tags, fields: Fields, timestamp: DateTime<Utc>) {
        self.metrics.push(Metric::new(name, tags, fields, timestamp));
    }

    fn add_error(&mut self, error: &dyn Error) {
        tracing::debug!(error = %error, "Accumulated cycle error");
        self.errors.push(error.to_string());
    }
}

// =============================================================================
// Tests
// =============================================================================
