// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client layers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         OpcUaInput                              │
//! │              (init / gather / stop, owns the session)           │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SessionManager                            │
//! │   (credentials, endpoint negotiation, connect/request timeouts) │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 OpcUaTransport / TransportFactory               │
//! │        (RealOpcUaTransport, MockTransport for tests)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod credentials;
pub mod mock;
mod session;
mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use credentials::{decode_pem_or_der, ClientCertificate};
pub use session::{select_endpoint, Session, SessionManager, SessionSettings};
pub use transport::{
    EndpointDescription, OpcUaTransport, OpcUaValue, ReadResult, TransportFactory, TransportSettings,
    TransportState, UserIdentity,
};

#[cfg(feature = "real-transport")]
pub use real_transport::{RealOpcUaTransport, RealTransportFactory};
