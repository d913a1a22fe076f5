// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA polling read client for uapoll.
//!
//! Reads a configured set of nodes from one server on every `gather` and
//! turns the results into tagged measurements.
//!
//! # Pipeline
//!
//! ```text
//! ReadClientConfig ──► build_mappings (merge_tags) ──► Vec<NodeMetricMapping>
//!                                                          │
//! SessionManager ──► Session ──► ReadExecutor::read_all ───┤
//!                                                          ▼
//!                                 emit_metrics ──► Accumulator
//! ```
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Configuration        - Fatal at init
//! ├── Authentication       - Per connect attempt
//! ├── SecurityNegotiation  - Per connect attempt
//! ├── Connection           - Reconnect next cycle
//! ├── Timeout              - Reconnect next cycle
//! └── Read                 - Whole cycle failed
//! ```
//!
//! # Example
//!
//! ```rust
//! use uapoll_core::MemoryAccumulator;
//! use uapoll_opcua::client::mock::{MockServer, MockTransportFactory};
//! use uapoll_opcua::client::OpcUaValue;
//! use uapoll_opcua::config::{NodeSettings, ReadClientConfig};
//! use uapoll_opcua::types::NodeId;
//! use uapoll_opcua::OpcUaInput;
//!
//! # tokio_test_block_on(async {
//! let server = MockServer::new();
//! server.set_value(NodeId::numeric(2, 1001), OpcUaValue::Double(21.5));
//!
//! let mut config = ReadClientConfig::new("opc.tcp://localhost:4840");
//! config.root_nodes.push(
//!     NodeSettings::new("temperature", "1001")
//!         .with_namespace("2")
//!         .with_identifier_type("i"),
//! );
//!
//! let mut input = OpcUaInput::new(config, MockTransportFactory::new(server));
//! input.init().unwrap();
//!
//! let mut acc = MemoryAccumulator::new();
//! input.gather(&mut acc).await.unwrap();
//! assert_eq!(acc.len(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod emit;
pub mod error;
pub mod input;
pub mod mapping;
pub mod read;
pub mod status;
pub mod tags;
pub mod types;

pub use error::{
    AuthenticationError, ConfigurationError, ConnectionError, ErrorCode, ErrorSeverity, NegotiationError,
    OpcUaError, OpcUaResult, ReadError, TimeoutError,
};

pub use config::{NodeGroupSettings, NodeSettings, ReadClientConfig, ReadClientWorkarounds, Workarounds};
pub use emit::{build_metrics, emit_metrics};
pub use input::OpcUaInput;
pub use mapping::{build_mappings, NodeMetricMapping};
pub use read::{decode_value, NodeReadIssue, NodeValue, ReadExecutor, ReadStats, ReadStatsSnapshot};
pub use status::{StatusCode, StatusCodeGate};
pub use tags::{merge_tags, TagSet};
pub use types::{
    AuthMethod, IdentifierType, NodeId, NodeIdentifier, SecurityMode, SecurityModeSetting, SecurityPolicy,
    SecurityPolicySetting,
};

pub use client::{
    OpcUaTransport, Session, SessionManager, SessionSettings, TransportFactory, TransportState,
};

#[cfg(feature = "real-transport")]
pub use client::{RealOpcUaTransport, RealTransportFactory};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
