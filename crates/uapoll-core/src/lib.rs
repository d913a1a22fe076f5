// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uapoll-core
//!
//! Shared measurement model for the uapoll polling agent.
//!
//! Input plugins turn protocol reads into [`Metric`]s and hand them to an
//! [`Accumulator`]. The accumulator is the only boundary between an input and
//! whatever ships the data downstream (stdout, a file, a message bus).
//!
//! - **Metric**: measurement name, tag set, typed fields, timestamp
//! - **FieldValue**: scalar field values preserving width and signedness
//! - **Accumulator**: the outbound sink for metrics and cycle-level errors
//!
//! ## Example
//!
//! ```rust
//! use uapoll_core::{Accumulator, FieldValue, MemoryAccumulator, Tags, Fields};
//! use chrono::Utc;
//!
//! let mut acc = MemoryAccumulator::new();
//! let mut fields = Fields::new();
//! fields.insert("temperature".to_string(), FieldValue::Float64(21.5));
//! acc.add_fields("plant", Tags::new(), fields, Utc::now());
//!
//! assert_eq!(acc.len(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod accumulator;
pub mod metric;

// =============================================================================
// Re-exports
// =============================================================================

pub use accumulator::{Accumulator, MemoryAccumulator, SharedAccumulator};
pub use metric::{FieldValue, Fields, Metric, Tags};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
