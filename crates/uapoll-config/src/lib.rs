// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uapoll-config
//!
//! Loads the agent configuration file.
//!
//! ## Features
//!
//! - **Multi-Format Support**: TOML, YAML and JSON, chosen by file extension
//! - **Environment Placeholders**: `${VAR}` and `${VAR:default}` in the raw text
//! - **Environment Overrides**: `UAPOLL_INTERVAL` replaces `agent.interval`
//! - **Path Resolution**: relative certificate and key paths are resolved
//!   against the directory of the configuration file
//!
//! ## Quick Start
//!
//! ```no_run
//! use uapoll_config::load_config;
//!
//! let config = load_config("uapoll.toml").unwrap();
//! println!("Interval: {:?}", config.agent.interval);
//! println!("Inputs: {}", config.inputs.opcua.len());
//! ```
//!
//! ## Configuration Schema
//!
//! ```toml
//! [agent]
//! interval = "10s"
//!
//! [[inputs.opcua]]
//! name = "plant"
//! endpoint = "opc.tcp://localhost:4840"
//!
//! [[inputs.opcua.nodes]]
//! name = "speed"
//! namespace = "2"
//! identifier_type = "s"
//! identifier = "Line1.Speed"
//! ```
//!
//! Node definitions are only checked structurally here. Each input
//! validates its nodes itself when it is initialized.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};
pub use schema::{AgentConfig, AgentSettings, InputsConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
