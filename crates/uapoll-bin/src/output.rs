// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! JSON-lines metric output.

use std::error::Error;
use std::io::{self, Stdout, Write};

use chrono::{DateTime, Utc};
use tracing::warn;

use uapoll_core::{Accumulator, Fields, Metric, Tags};

/// Writes each metric as one JSON document per line.
///
/// Cycle errors are already logged by the input, so they are only counted.
pub struct JsonLinesAccumulator<W: Write + Send> {
    writer: W,
    metrics_written: u64,
    errors_seen: u64,
}

/// The accumulator used by the agent.
pub type StdoutAccumulator = JsonLinesAccumulator<Stdout>;

impl JsonLinesAccumulator<Stdout> {
    /// Writes to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesAccumulator<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            metrics_written: 0,
            errors_seen: 0,
        }
    }

    /// Metrics written so far.
    pub fn metrics_written(&self) -> u64 {
        self.metrics_written
    }

    /// Cycle errors received so far.
    pub fn errors_seen(&self) -> u64 {
        self.errors_seen
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_metric(&mut self, metric: &Metric) -> io::Result<()> {
        let line = metric
            .to_json_line()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()
    }
}

impl<W: Write + Send> Accumulator for JsonLinesAccumulator<W> {
    fn add_fields(&mut self, name: &str, tags: Tags, fields: Fields, timestamp: DateTime<Utc>) {
        let metric = Metric::new(name, tags, fields, timestamp);
        match self.write_metric(&metric) {
            Ok(()) => self.metrics_written += 1,
            Err(e) => warn!(metric = %name, error = %e, "Failed to write metric"),
        }
    }

    fn add_error(&mut self, _error: &dyn Error) {
        self.errors_seen += 1;
    }
}

// =============================================================================
// Tests
// =============================================================================
