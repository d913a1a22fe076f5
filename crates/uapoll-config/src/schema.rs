// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Agent configuration schema.
//!
//! # Schema Structure
//!
//! ```text
//! AgentConfig
//! ├── agent: AgentSettings
//! └── inputs: InputsConfig
//!     └── opcua: Vec<ReadClientConfig>
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uapoll_opcua::ReadClientConfig;

use crate::error::{ConfigError, ConfigResult};

/// Default collection interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// AgentConfig
// =============================================================================

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent-wide settings.
    #[serde(default)]
    pub agent: AgentSettings,

    /// Configured inputs.
    #[serde(default)]
    pub inputs: InputsConfig,
}

impl AgentConfig {
    /// Structural validation.
    ///
    /// Node definitions are left to each input's own initialization.
    pub fn validate(&self) -> ConfigResult<()> {
        self.agent.validate()?;

        if self.inputs.opcua.is_empty() {
            return Err(ConfigError::validation("inputs.opcua", "no inputs configured"));
        }

        let mut seen = HashSet::new();
        for (index, input) in self.inputs.opcua.iter().enumerate() {
            if input.endpoint.is_empty() {
                return Err(ConfigError::validation(
                    format!("inputs.opcua[{}].endpoint", index),
                    "endpoint is required",
                ));
            }
            if !seen.insert((input.metric_name.as_str(), input.endpoint.as_str())) {
                return Err(ConfigError::validation(
                    format!("inputs.opcua[{}]", index),
                    format!(
                        "input '{}' for {} is configured twice",
                        input.metric_name, input.endpoint
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Total number of configured nodes across all inputs.
    pub fn node_count(&self) -> usize {
        self.inputs.opcua.iter().map(ReadClientConfig::node_count).sum()
    }
}

// =============================================================================
// AgentSettings
// =============================================================================

/// Settings shared by every input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Time between collection cycles.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl AgentSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::validation("agent.interval", "must be greater than zero"));
        }
        Ok(())
    }
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

// =============================================================================
// InputsConfig
// =============================================================================

/// Input plugin sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputsConfig {
    /// `[[inputs.opcua]]` blocks, in file order.
    #[serde(default)]
    pub opcua: Vec<ReadClientConfig>,
}

// =============================================================================
// Serde Helpers
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, endpoint: &str) -> ReadClientConfig {
        let mut config = ReadClientConfig::new(endpoint);
        config.metric_name = name.into();
        config
    }

    #[test]
    fn test_defaults() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.agent.interval, Duration::from_secs(10));
        assert!(config.inputs.opcua.is_empty());
    }

    #[test]
    fn test_interval_parsing() {
        let config: AgentConfig = toml::from_str("[agent]\ninterval = \"1m 30s\"").unwrap();
        assert_eq!(config.agent.interval, Duration::from_secs(90));
    }

    #[test]
    fn test_validation() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_err());

        config.inputs.opcua.push(input("plant", "opc.tcp://a:4840"));
        config.validate().unwrap();

        config.inputs.opcua.push(input("plant", "opc.tcp://a:4840"));
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));

        config.inputs.opcua.pop();
        config.agent.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
