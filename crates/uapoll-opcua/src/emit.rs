// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Metric emitter.
//!
//! Folds index-aligned mappings and values into one [`Metric`] per metric
//! name, in order of first appearance. Absent values add nothing; a name
//! with no present value produces no metric at all. Tags are the union of
//! the contributing nodes' tags, later nodes overwriting earlier ones.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uapoll_core::{Accumulator, Fields, Metric, Tags};

use crate::mapping::NodeMetricMapping;
use crate::read::NodeValue;

/// Builds the metrics for one cycle.
pub fn build_metrics(
    mappings: &[NodeMetricMapping],
    values: &[NodeValue],
    timestamp: DateTime<Utc>,
) -> Vec<Metric> {
    if mappings.len() != values.len() {
        warn!(
            mappings = mappings.len(),
            values = values.len(),
            "Value count does not match mapping count"
        );
    }

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, (Tags, Fields)> = HashMap::new();

    for (mapping, node) in mappings.iter().zip(values) {
        let Some(value) = &node.value else {
            continue;
        };

        let (tags, fields) = groups.entry(mapping.metric_name.as_str()).or_insert_with(|| {
            order.push(mapping.metric_name.as_str());
            (Tags::new(), Fields::new())
        });
        fields.insert(mapping.field_name.clone(), value.clone());
        for (key, tag_value) in &mapping.tags {
            tags.insert(key.clone(), tag_value.clone());
        }
    }

    order
        .into_iter()
        .filter_map(|name| {
            groups
                .remove(name)
                .map(|(tags, fields)| Metric::new(name, tags, fields, timestamp))
        })
        .collect()
}

/// Builds the metrics for one cycle and hands them to `acc`.
///
/// Returns the number of metrics emitted.
pub fn emit_metrics<A: Accumulator + ?Sized>(
    mappings: &[NodeMetricMapping],
    values: &[NodeValue],
    timestamp: DateTime<Utc>,
    acc: &mut A,
) -> usize {
    let metrics = build_metrics(mappings, values, timestamp);
    let count = metrics.len();
    for metric in metrics {
        debug!(metric = %metric.name, fields = metric.fields.len(), "Emitting metric");
        acc.add_fields(&metric.name, metric.tags, metric.fields, metric.timestamp);
    }
    count
}

// =============================================================================
// Tests
// =============================================================================
