// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use serde::Serialize;

use uapoll_config::AgentConfig;
use uapoll_opcua::{build_mappings, OpcUaResult, ReadClientConfig, StatusCodeGate};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Validation outcome for one input.
#[derive(Debug, Clone, Serialize)]
pub struct InputCheck {
    /// Root metric name.
    pub name: String,
    /// Server endpoint.
    pub endpoint: String,
    /// Resolved node descriptions, empty when invalid.
    pub mappings: Vec<String>,
    /// The first problem found, if any.
    pub error: Option<String>,
}

impl InputCheck {
    fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs every offline check an input performs at init.
pub fn check_input(config: &ReadClientConfig) -> InputCheck {
    let resolved = (|| -> OpcUaResult<Vec<String>> {
        config.validate()?;
        StatusCodeGate::parse(config.workarounds.additional_valid_status_codes.as_slice())?;
        let mappings = build_mappings(config)?;
        Ok(mappings.iter().map(|m| m.describe()).collect())
    })();

    let (mappings, error) = match resolved {
        Ok(mappings) => (mappings, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    InputCheck {
        name: config.metric_name.clone(),
        endpoint: config.endpoint.clone(),
        mappings,
        error,
    }
}

/// Checks every input of a loaded configuration.
pub fn check_config(config: &AgentConfig) -> Vec<InputCheck> {
    config.inputs.opcua.iter().map(check_input).collect()
}

/// Executes the `validate` command. No connection is attempted.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::InvalidConfig(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = uapoll_config::load_config(config_path)
        .map_err(|e| BinError::InvalidConfig(format!("Configuration validation failed: {}", e.user_message())))?;

    let checks = check_config(&config);
    let invalid = checks.iter().filter(|c| !c.is_valid()).count();

    match args.format {
        OutputFormat::Text => {
            if invalid == 0 {
                println!("✓ Configuration is valid: {}", config_path.display());
            } else {
                println!("✗ Configuration has errors: {}", config_path.display());
            }
            println!();
            println!("Summary:");
            println!("  Interval: {}", humantime::format_duration(config.agent.interval));
            println!("  Inputs:   {}", checks.len());
            println!("  Nodes:    {}", config.node_count());
            for check in &checks {
                println!();
                match &check.error {
                    None => println!("  ✓ {} ({})", check.name, check.endpoint),
                    Some(e) => println!("  ✗ {} ({}): {}", check.name, check.endpoint, e),
                }
                if args.show_mappings {
                    for mapping in &check.mappings {
                        println!("      {}", mapping);
                    }
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": invalid == 0,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "interval": humantime::format_duration(config.agent.interval).to_string(),
                    "input_count": checks.len(),
                    "node_count": config.node_count(),
                },
                "inputs": checks,
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::collection(format!("failed to render report: {}", e)))?;
            println!("{}", rendered);
        }
    }

    if invalid > 0 {
        return Err(BinError::InvalidConfig(format!("{} input(s) failed validation", invalid)));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
