// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag merging.

use std::collections::BTreeMap;

use crate::error::ConfigurationError;

/// A resolved tag set.
pub type TagSet = BTreeMap<String, String>;

/// Combines three tag layers into one.
///
/// `defaults` is applied first, then `group`, then `node`; each layer
/// overwrites keys set by the ones before it. Inputs are not modified.
pub fn merge_tags(defaults: &TagSet, group: &TagSet, node: &TagSet) -> TagSet {
    let mut merged = defaults.clone();
    for layer in [group, node] {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Converts `[["key", "value"], ...]` into a tag set.
///
/// Later pairs overwrite earlier pairs with the same key. Every pair must
/// have exactly two elements and a non-empty key.
pub fn tags_from_pairs(pairs: &[Vec<String>], context: &str) -> Result<TagSet, ConfigurationError> {
    let mut tags = TagSet::new();
    for (index, pair) in pairs.iter().enumerate() {
        match pair.as_slice() {
            [key, value] if !key.is_empty() => {
                tags.insert(key.clone(), value.clone());
            }
            [_, _] => {
                return Err(ConfigurationError::invalid_tags(
                    context,
                    format!("tag #{} has an empty key", index + 1),
                ))
            }
            other => {
                return Err(ConfigurationError::invalid_tags(
                    context,
                    format!(
                        "tag #{} must be a [key, value] pair, got {} element(s)",
                        index + 1,
                        other.len()
                    ),
                ))
            }
        }
    }
    Ok(tags)
}

/// Resolves one configuration layer: the map form wins when non-empty,
/// otherwise the pair list is used.
pub fn layer_tags(
    map: &BTreeMap<String, String>,
    pairs: &[Vec<String>],
    context: &str,
) -> Result<TagSet, ConfigurationError> {
    if !map.is_empty() {
        if map.keys().any(String::is_empty) {
            return Err(ConfigurationError::invalid_tags(context, "empty tag key"));
        }
        return Ok(map.clone());
    }
    tags_from_pairs(pairs, context)
}

// =============================================================================
// Tests
// =============================================================================
