// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uapoll-bin
//!
//! The `uapoll` agent binary.
//!
//! - CLI argument parsing with clap
//! - Logging initialization
//! - Signal-driven shutdown
//! - The interval-driven collection loop, one task per input
//! - JSON-lines output of every measurement
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────┐
//!                    │   main.rs   │
//!                    └──────┬──────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │   cli.rs    │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └──────────┘ └────┬─────┘ └──────────┘
//!                          │
//!               ┌──────────┼──────────┐
//!               ▼                     ▼
//!        ┌─────────────┐       ┌─────────────┐
//!        │  shutdown   │       │   output    │
//!        └─────────────┘       └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Collect until SIGINT/SIGTERM (default command)
//! uapoll -c /etc/uapoll/uapoll.toml
//!
//! # Gather once per input, print, exit
//! uapoll once
//!
//! # Check the configuration without connecting
//! uapoll validate
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use output::JsonLinesAccumulator;
pub use runtime::{CollectionRuntime, InputSummary, OnceReport};
pub use shutdown::{ShutdownCoordinator, ShutdownToken};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
