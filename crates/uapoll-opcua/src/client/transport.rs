// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The transport does the protocol work (endpoint discovery, secure
//! channel, session, register and read services). Endpoint selection,
//! credential loading and deadlines live one layer up in the
//! [`SessionManager`](super::SessionManager), so a transport only has to
//! do what it is told.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OpcUaResult;
use crate::status::StatusCode;
use crate::types::{AuthMethod, NodeId, SecurityMode, SecurityPolicy};

use super::credentials::ClientCertificate;

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Transport is not connected.
    #[default]
    Disconnected,

    /// Transport is establishing connection.
    Connecting,

    /// Transport is connected and ready.
    Connected,

    /// Transport connection has failed.
    Failed,
}

impl TransportState {
    /// Returns `true` if the transport is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the transport has failed.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// TransportSettings
// =============================================================================

/// Everything a transport needs to build its client.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Server endpoint URL.
    pub endpoint: String,

    /// Application name announced to the server.
    pub application_name: String,

    /// Requested session lifetime.
    pub session_timeout: Duration,

    /// Per-request deadline, also passed to the protocol stack.
    pub request_timeout: Duration,

    /// Client application certificate, if configured.
    pub client_certificate: Option<ClientCertificate>,
}

impl TransportSettings {
    /// Creates settings for an endpoint with default timeouts.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            application_name: "uapoll".to_string(),
            session_timeout: Duration::from_secs(20 * 60),
            request_timeout: Duration::from_secs(5),
            client_certificate: None,
        }
    }
}

// =============================================================================
// EndpointDescription
// =============================================================================

/// One endpoint advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    /// Endpoint URL as reported by the server.
    pub url: String,

    /// Security policy.
    pub security_policy: SecurityPolicy,

    /// Message security mode.
    pub security_mode: SecurityMode,

    /// Server-assigned relative security level.
    pub security_level: u8,

    /// User identity kinds the endpoint accepts.
    pub user_token_types: Vec<AuthMethod>,
}

impl EndpointDescription {
    /// Creates an endpoint accepting every user token kind.
    pub fn new(url: impl Into<String>, security_policy: SecurityPolicy, security_mode: SecurityMode) -> Self {
        Self {
            url: url.into(),
            security_policy,
            security_mode,
            security_level: 0,
            user_token_types: vec![AuthMethod::Anonymous, AuthMethod::UserName, AuthMethod::Certificate],
        }
    }

    /// Sets the security level.
    pub fn with_security_level(mut self, level: u8) -> Self {
        self.security_level = level;
        self
    }

    /// Restricts the accepted user token kinds.
    pub fn with_user_tokens(mut self, tokens: impl IntoIterator<Item = AuthMethod>) -> Self {
        self.user_token_types = tokens.into_iter().collect();
        self
    }

    /// Returns `true` if the endpoint accepts `method`.
    pub fn accepts_token(&self, method: AuthMethod) -> bool {
        self.user_token_types.contains(&method)
    }
}

impl fmt::Display for EndpointDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}/{}]", self.url, self.security_policy, self.security_mode)
    }
}

// =============================================================================
// UserIdentity
// =============================================================================

/// Identity presented when activating the session.
#[derive(Clone)]
pub enum UserIdentity {
    /// No credentials.
    Anonymous,

    /// Username and password.
    UserName {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },

    /// X.509 certificate and key.
    Certificate(ClientCertificate),
}

impl UserIdentity {
    /// Returns the configured method this identity represents.
    pub fn method(&self) -> AuthMethod {
        match self {
            Self::Anonymous => AuthMethod::Anonymous,
            Self::UserName { .. } => AuthMethod::UserName,
            Self::Certificate(_) => AuthMethod::Certificate,
        }
    }
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Certificate(cert) => f.debug_tuple("Certificate").field(&cert.certificate_path).finish(),
        }
    }
}

// =============================================================================
// ReadResult
// =============================================================================

/// Result of reading one node.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// The node ID that was read.
    pub node_id: NodeId,

    /// The value, if the server returned one.
    pub value: Option<OpcUaValue>,

    /// Per-node status.
    pub status_code: StatusCode,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl ReadResult {
    /// Creates a good result carrying a value.
    pub fn success(node_id: NodeId, value: OpcUaValue) -> Self {
        Self {
            node_id,
            value: Some(value),
            status_code: StatusCode::GOOD,
            server_timestamp: Some(Utc::now()),
            source_timestamp: None,
        }
    }

    /// Creates a result with a status and no value.
    pub fn failure(node_id: NodeId, status_code: impl Into<StatusCode>) -> Self {
        Self {
            node_id,
            value: None,
            status_code: status_code.into(),
            server_timestamp: Some(Utc::now()),
            source_timestamp: None,
        }
    }

    /// Replaces the status, keeping any value.
    pub fn with_status(mut self, status_code: impl Into<StatusCode>) -> Self {
        self.status_code = status_code.into();
        self
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// Value as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean value.
    Boolean(bool),

    /// Signed byte.
    SByte(i8),

    /// Unsigned byte.
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 64-bit signed integer.
    Int64(i64),

    /// 64-bit unsigned integer.
    UInt64(u64),

    /// 32-bit float.
    Float(f32),

    /// 64-bit double.
    Double(f64),

    /// String value.
    String(String),

    /// Date/time value.
    DateTime(DateTime<Utc>),

    /// GUID value.
    Guid(uuid::Uuid),

    /// Byte string.
    ByteString(Vec<u8>),

    /// Array of values.
    Array(Vec<OpcUaValue>),

    /// Null value.
    #[default]
    Null,

    /// A structured or otherwise unmapped type, by name.
    Unsupported(String),
}

impl OpcUaValue {
    /// Returns the OPC UA type name.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
            Self::ByteString(_) => "ByteString",
            Self::Array(_) => "Array",
            Self::Null => "Null",
            Self::Unsupported(name) => name,
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
            Self::Unsupported(name) => write!(f, "<{}>", name),
        }
    }
}

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Abstract transport for OPC UA communication.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the read path takes `&self`.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Asks the server which endpoints it offers.
    async fn get_endpoints(&mut self) -> OpcUaResult<Vec<EndpointDescription>>;

    /// Opens the secure channel and activates a session on `endpoint`.
    async fn connect(&mut self, endpoint: &EndpointDescription, identity: &UserIdentity) -> OpcUaResult<()>;

    /// Closes the session and channel. Calling it while disconnected is a no-op.
    async fn disconnect(&mut self) -> OpcUaResult<()>;

    /// Returns the current transport state.
    fn state(&self) -> TransportState;

    /// Returns `true` if the transport is currently connected.
    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Registers nodes for repeated access, returning server handles in
    /// request order.
    async fn register_nodes(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<NodeId>>;

    /// Reads the value attribute of several nodes in one request.
    ///
    /// Results are in request order.
    async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<ReadResult>>;

    /// Reads a single node value.
    async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<ReadResult> {
        let mut results = self.read_values(std::slice::from_ref(node_id)).await?;
        if results.len() != 1 {
            return Err(crate::error::ReadError::result_count_mismatch(1, results.len()).into());
        }
        results
            .pop()
            .ok_or_else(|| crate::error::ReadError::result_count_mismatch(1, 0).into())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Returns the server endpoint URL.
    fn endpoint(&self) -> &str;
}

// =============================================================================
// TransportFactory
// =============================================================================

/// Creates a fresh transport for every connect attempt.
pub trait TransportFactory: Send + Sync {
    /// The transport type produced.
    type Transport: OpcUaTransport + 'static;

    /// Builds an unconnected transport.
    fn create(&self, settings: &TransportSettings) -> OpcUaResult<Self::Transport>;
}

// =============================================================================
// Tests
// =============================================================================
