// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Read client configuration.
//!
//! These structs mirror the configuration file one to one. They hold raw
//! text (namespaces, identifier types, tag pairs) and are resolved into
//! typed [`NodeMetricMapping`](crate::mapping::NodeMetricMapping)s by
//! [`build_mappings`](crate::mapping::build_mappings) during `init`.
//!
//! ```toml
//! [[inputs.opcua]]
//! name = "plant"
//! endpoint = "opc.tcp://localhost:4840"
//! security_policy = "auto"
//!
//! [[inputs.opcua.nodes]]
//!   name = "speed"
//!   namespace = "2"
//!   identifier_type = "s"
//!   identifier = "Line1.Speed"
//!   tags = [["line", "1"]]
//!
//! [[inputs.opcua.group]]
//!   name = "boiler"
//!   namespace = "3"
//!   identifier_type = "i"
//!   nodes = [{ name = "pressure", identifier = "3000" }]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaResult};
use crate::types::{
    humantime_serde, validate_security_pair, AuthMethod, SecurityModeSetting, SecurityPolicySetting,
};

// =============================================================================
// Defaults
// =============================================================================

fn default_metric_name() -> String {
    "opcua".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(20 * 60)
}

// =============================================================================
// ReadClientConfig
// =============================================================================

/// Top-level configuration of one OPC UA input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadClientConfig {
    /// Metric name used by root-level nodes.
    #[serde(rename = "name", default = "default_metric_name")]
    pub metric_name: String,

    /// Server endpoint URL (`opc.tcp://host:port/path`).
    pub endpoint: String,

    /// Deadline for the whole connect handshake.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Deadline for each request on an open session.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Session lifetime requested from the server.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Security policy, `auto` by default.
    #[serde(default)]
    pub security_policy: SecurityPolicySetting,

    /// Security mode, `auto` by default.
    #[serde(default)]
    pub security_mode: SecurityModeSetting,

    /// Client certificate path (PEM or DER).
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_path_as_none")]
    pub certificate: Option<PathBuf>,

    /// Client private key path (PEM or DER).
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "empty_path_as_none")]
    pub private_key: Option<PathBuf>,

    /// User identity kind.
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Username for `UserName` auth.
    #[serde(default)]
    pub username: String,

    /// Password for `UserName` auth.
    #[serde(default)]
    pub password: String,

    /// Plugin-wide tags; the lowest-priority layer of every node's tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    /// Status code handling.
    #[serde(default)]
    pub workarounds: Workarounds,

    /// Read request handling.
    #[serde(default, rename = "request_workarounds")]
    pub read_workarounds: ReadClientWorkarounds,

    /// Nodes read into the plugin-level metric.
    #[serde(default, rename = "nodes")]
    pub root_nodes: Vec<NodeSettings>,

    /// Node groups.
    #[serde(default, rename = "group", alias = "groups")]
    pub groups: Vec<NodeGroupSettings>,
}

impl ReadClientConfig {
    /// Creates a configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            metric_name: default_metric_name(),
            endpoint: endpoint.into(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            session_timeout: default_session_timeout(),
            security_policy: SecurityPolicySetting::Auto,
            security_mode: SecurityModeSetting::Auto,
            certificate: None,
            private_key: None,
            auth_method: AuthMethod::Anonymous,
            username: String::new(),
            password: String::new(),
            tags: BTreeMap::new(),
            workarounds: Workarounds::default(),
            read_workarounds: ReadClientWorkarounds::default(),
            root_nodes: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Total number of configured nodes across root and groups.
    pub fn node_count(&self) -> usize {
        self.root_nodes.len() + self.groups.iter().map(|g| g.nodes.len()).sum::<usize>()
    }

    /// Validates connection-level settings.
    ///
    /// Node definitions are validated by the mapping builder.
    pub fn validate(&self) -> OpcUaResult<()> {
        if self.endpoint.is_empty() {
            return Err(ConfigurationError::invalid_endpoint("", "endpoint is empty").into());
        }
        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(ConfigurationError::invalid_endpoint(
                &self.endpoint,
                "endpoint must start with opc.tcp://",
            )
            .into());
        }
        if self.metric_name.is_empty() {
            return Err(ConfigurationError::empty_name("metric name", "plugin settings").into());
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigurationError::invalid_timeout(
                "connect_timeout",
                self.connect_timeout,
                "must be greater than zero",
            )
            .into());
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigurationError::invalid_timeout(
                "request_timeout",
                self.request_timeout,
                "must be greater than zero",
            )
            .into());
        }
        validate_security_pair(self.security_policy, self.security_mode)?;
        Ok(())
    }
}

fn empty_path_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(PathBuf::from))
}

// =============================================================================
// Workarounds
// =============================================================================

/// Status code handling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workarounds {
    /// Extra status codes treated as success, hex (`0xC0`) or decimal.
    #[serde(default)]
    pub additional_valid_status_codes: Vec<String>,
}

/// Read request handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadClientWorkarounds {
    /// Read each node in its own request instead of one registered batch.
    #[serde(default)]
    pub use_unregistered_reads: bool,
}

// =============================================================================
// NodeSettings / NodeGroupSettings
// =============================================================================

/// One configured node.
///
/// `namespace` and `identifier_type` may be left empty inside a group and
/// are then inherited from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Field name.
    #[serde(rename = "name", default)]
    pub field_name: String,

    /// Namespace index as decimal text.
    #[serde(default)]
    pub namespace: String,

    /// `i`, `s`, `g` or `b`.
    #[serde(default)]
    pub identifier_type: String,

    /// Identifier text.
    #[serde(default)]
    pub identifier: String,

    /// Tag pairs, `[["key", "value"], ...]`.
    #[serde(rename = "tags", default, skip_serializing_if = "Vec::is_empty")]
    pub tags_slice: Vec<Vec<String>>,

    /// Tag map; when non-empty it replaces `tags` for this node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default_tags: BTreeMap<String, String>,
}

impl NodeSettings {
    /// Creates a node with field name and identifier, inheriting the rest.
    pub fn new(field_name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Sets the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the identifier type.
    pub fn with_identifier_type(mut self, identifier_type: impl Into<String>) -> Self {
        self.identifier_type = identifier_type.into();
        self
    }

    /// Appends a tag pair.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags_slice.push(vec![key.into(), value.into()]);
        self
    }

    /// Sets a default tag.
    pub fn with_default_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_tags.insert(key.into(), value.into());
        self
    }
}

/// A named collection of nodes sharing defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupSettings {
    /// Metric name for every node in the group.
    #[serde(rename = "name", default)]
    pub metric_name: String,

    /// Namespace inherited by nodes that leave it empty.
    #[serde(default)]
    pub namespace: String,

    /// Identifier type inherited by nodes that leave it empty.
    #[serde(default)]
    pub identifier_type: String,

    /// Group tag pairs.
    #[serde(rename = "tags", default, skip_serializing_if = "Vec::is_empty")]
    pub tags_slice: Vec<Vec<String>>,

    /// Group tag map; when non-empty it replaces `tags` for the group.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default_tags: BTreeMap<String, String>,

    /// Nodes in config order.
    #[serde(default)]
    pub nodes: Vec<NodeSettings>,
}

impl NodeGroupSettings {
    /// Creates an empty group.
    pub fn new(
        metric_name: impl Into<String>,
        namespace: impl Into<String>,
        identifier_type: impl Into<String>,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            namespace: namespace.into(),
            identifier_type: identifier_type.into(),
            ..Default::default()
        }
    }

    /// Appends a group tag pair.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags_slice.push(vec![key.into(), value.into()]);
        self
    }

    /// Appends a node.
    pub fn with_node(mut self, node: NodeSettings) -> Self {
        self.nodes.push(node);
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
