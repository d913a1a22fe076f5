// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node mapping builder.
//!
//! Flattens root nodes and groups into one ordered list of
//! [`NodeMetricMapping`]s. Root nodes come first in config order, followed
//! by each group's nodes in config order. Read results are aligned with
//! this list by index, so the order is part of the contract.

use std::collections::HashSet;

use crate::config::{NodeGroupSettings, NodeSettings, ReadClientConfig};
use crate::error::ConfigurationError;
use crate::tags::{layer_tags, merge_tags, TagSet};
use crate::types::{IdentifierType, NodeId};

// =============================================================================
// NodeMetricMapping
// =============================================================================

/// A resolved node: where to read it and where its value goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetricMapping {
    /// Resolved protocol address.
    pub node_id: NodeId,
    /// Measurement name.
    pub metric_name: String,
    /// Field name within the measurement.
    pub field_name: String,
    /// Final merged tags.
    pub tags: TagSet,
}

impl NodeMetricMapping {
    /// Returns a short description for log lines.
    pub fn describe(&self) -> String {
        format!("{}.{} ({})", self.metric_name, self.field_name, self.node_id)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds the mapping list for a plugin configuration.
pub fn build_mappings(config: &ReadClientConfig) -> Result<Vec<NodeMetricMapping>, ConfigurationError> {
    build(&config.metric_name, &config.tags, &config.root_nodes, &config.groups)
}

/// Builds mappings from explicit parts.
///
/// `default_tags` is the lowest tag layer for every node; `root_metric` is
/// the measurement name of root nodes.
pub fn build(
    root_metric: &str,
    default_tags: &TagSet,
    root_nodes: &[NodeSettings],
    groups: &[NodeGroupSettings],
) -> Result<Vec<NodeMetricMapping>, ConfigurationError> {
    let capacity = root_nodes.len() + groups.iter().map(|g| g.nodes.len()).sum::<usize>();
    let mut mappings = Vec::with_capacity(capacity);
    let no_group_tags = TagSet::new();

    for node in root_nodes {
        let context = format!("root node \"{}\"", node.field_name);
        mappings.push(resolve_node(
            root_metric,
            node,
            None,
            default_tags,
            &no_group_tags,
            &context,
        )?);
    }

    for group in groups {
        let group_context = format!("group \"{}\"", group.metric_name);
        if group.metric_name.is_empty() {
            return Err(ConfigurationError::empty_name("metric name", group_context));
        }
        let group_tags = layer_tags(&group.default_tags, &group.tags_slice, &group_context)?;

        for node in &group.nodes {
            let context = format!("{} node \"{}\"", group_context, node.field_name);
            mappings.push(resolve_node(
                &group.metric_name,
                node,
                Some(group),
                default_tags,
                &group_tags,
                &context,
            )?);
        }
    }

    reject_duplicates(&mappings)?;
    Ok(mappings)
}

fn resolve_node(
    metric_name: &str,
    node: &NodeSettings,
    group: Option<&NodeGroupSettings>,
    default_tags: &TagSet,
    group_tags: &TagSet,
    context: &str,
) -> Result<NodeMetricMapping, ConfigurationError> {
    if node.field_name.is_empty() {
        return Err(ConfigurationError::empty_name("field name", context));
    }
    if metric_name.is_empty() {
        return Err(ConfigurationError::empty_name("metric name", context));
    }

    let namespace = inherit(&node.namespace, group.map(|g| g.namespace.as_str()));
    let identifier_type = inherit(&node.identifier_type, group.map(|g| g.identifier_type.as_str()));

    if namespace.is_empty() {
        return Err(ConfigurationError::invalid_node(context, "empty namespace"));
    }
    if identifier_type.is_empty() {
        return Err(ConfigurationError::invalid_node(context, "empty identifier type"));
    }
    if node.identifier.is_empty() {
        return Err(ConfigurationError::invalid_node(context, "empty identifier"));
    }

    let namespace_index: u16 = namespace.parse().map_err(|_| {
        ConfigurationError::invalid_node(context, format!("namespace '{}' is not a u16", namespace))
    })?;
    let id_type: IdentifierType = identifier_type
        .parse()
        .map_err(|reason: String| ConfigurationError::invalid_node(context, reason))?;
    let identifier = id_type
        .parse_identifier(&node.identifier)
        .map_err(|reason| ConfigurationError::invalid_node(context, reason))?;

    let node_tags = layer_tags(&node.default_tags, &node.tags_slice, context)?;

    Ok(NodeMetricMapping {
        node_id: NodeId::new(namespace_index, identifier),
        metric_name: metric_name.to_string(),
        field_name: node.field_name.clone(),
        tags: merge_tags(default_tags, group_tags, &node_tags),
    })
}

fn inherit<'a>(own: &'a str, inherited: Option<&'a str>) -> &'a str {
    if own.is_empty() {
        inherited.unwrap_or("")
    } else {
        own
    }
}

fn reject_duplicates(mappings: &[NodeMetricMapping]) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::with_capacity(mappings.len());
    for mapping in mappings {
        let key = (&mapping.metric_name, &mapping.field_name, &mapping.tags);
        if !seen.insert(key) {
            return Err(ConfigurationError::duplicate_node(
                &mapping.metric_name,
                &mapping.field_name,
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
