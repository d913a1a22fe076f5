// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the OPC UA read client.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Configuration        - Invalid node/group/plugin settings (fatal at init)
//! ├── Authentication       - Missing or malformed credentials (per connect attempt)
//! ├── SecurityNegotiation  - No endpoint matches the requested policy/mode
//! ├── Connection           - Transport refused, dropped, or not connected
//! ├── Timeout              - Connect or request deadline exceeded
//! └── Read                 - A whole read cycle failed
//! ```
//!
//! A single unreadable node is not an error at this level. It is recorded
//! as an absent value on the node (see [`crate::read::NodeReadIssue`]).
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use uapoll_opcua::error::{OpcUaError, TimeoutError};
//!
//! let error = OpcUaError::timeout(TimeoutError::request("read", Duration::from_secs(5)));
//! assert!(error.is_retryable());
//! assert!(error.requires_reconnect());
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::status::StatusCode;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for the read client.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Credential errors.
    #[error("{0}")]
    Authentication(#[from] AuthenticationError),

    /// Security policy/mode negotiation errors.
    #[error("{0}")]
    SecurityNegotiation(#[from] NegotiationError),

    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    /// Whole-cycle read failures.
    #[error("{0}")]
    Read(#[from] ReadError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates an authentication error.
    #[inline]
    pub fn authentication(error: AuthenticationError) -> Self {
        Self::Authentication(error)
    }

    /// Creates a negotiation error.
    #[inline]
    pub fn negotiation(error: NegotiationError) -> Self {
        Self::SecurityNegotiation(error)
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    /// Creates a read error.
    #[inline]
    pub fn read(error: ReadError) -> Self {
        Self::Read(error)
    }

    /// Shorthand for [`ConnectionError::NotConnected`].
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if a later collection cycle may succeed.
    ///
    /// Configuration errors are never retryable. Authentication and
    /// negotiation failures are retried by the next cycle's connect.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::Authentication(_) | Self::SecurityNegotiation(_) => true,
            Self::Connection(_) | Self::Timeout(_) | Self::Read(_) => true,
        }
    }

    /// Returns `true` if the current session must be discarded.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::Read(_))
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::Authentication(_) | Self::SecurityNegotiation(_) => ErrorSeverity::Error,
            Self::Connection(_) | Self::Read(_) => ErrorSeverity::Error,
            Self::Timeout(_) => ErrorSeverity::Warning,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Authentication(_) => "authentication",
            Self::SecurityNegotiation(_) => "security",
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Read(_) => "read",
        }
    }

    /// Returns a structured error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Configuration(e) => e.error_code(),
            Self::Authentication(e) => e.error_code(),
            Self::SecurityNegotiation(e) => e.error_code(),
            Self::Connection(e) => e.error_code(),
            Self::Timeout(e) => e.error_code(),
            Self::Read(e) => e.error_code(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Invalid plugin, group or node settings.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A node definition cannot be resolved into an address.
    #[error("Invalid node {node}: {reason}")]
    InvalidNode {
        /// Where the node was defined, e.g. `group "foo" node "name3"`.
        node: String,
        /// Reason.
        reason: String,
    },

    /// A required name is empty.
    #[error("Empty {what} in {context}")]
    EmptyName {
        /// Which name is empty (`field name`, `metric name`).
        what: &'static str,
        /// Where it was found.
        context: String,
    },

    /// Two nodes resolve to the same metric, field and tags.
    #[error("Node '{field}' of metric '{metric}' is duplicated (same field name and tags)")]
    DuplicateNode {
        /// Metric name.
        metric: String,
        /// Field name.
        field: String,
    },

    /// A tag pair is malformed.
    #[error("Invalid tags in {context}: {reason}")]
    InvalidTags {
        /// Where the tags were defined.
        context: String,
        /// Reason.
        reason: String,
    },

    /// An allowlisted status code does not parse.
    #[error("Invalid status code '{value}': expected hex (0x...) or decimal u32")]
    InvalidStatusCode {
        /// The raw value.
        value: String,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint {
        /// The URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// Unknown security policy name.
    #[error("Invalid security policy: {policy}")]
    InvalidSecurityPolicy {
        /// The raw value.
        policy: String,
    },

    /// Unknown security mode name.
    #[error("Invalid security mode: {mode}")]
    InvalidSecurityMode {
        /// The raw value.
        mode: String,
    },

    /// Policy and mode cannot be used together.
    #[error("Invalid security settings: {message}")]
    InvalidSecurity {
        /// Explanation.
        message: String,
    },

    /// Unknown authentication method.
    #[error("Invalid auth method: {method}")]
    InvalidAuthMethod {
        /// The raw value.
        method: String,
    },

    /// Invalid timeout.
    #[error("Invalid {name}: {duration:?} ({reason})")]
    InvalidTimeout {
        /// Setting name.
        name: &'static str,
        /// The value.
        duration: Duration,
        /// Reason.
        reason: String,
    },

    /// `gather` was called before `init` succeeded.
    #[error("Input has not been initialized")]
    NotInitialized,
}

impl ConfigurationError {
    /// Creates an invalid node error.
    pub fn invalid_node(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Creates an empty name error.
    pub fn empty_name(what: &'static str, context: impl Into<String>) -> Self {
        Self::EmptyName {
            what,
            context: context.into(),
        }
    }

    /// Creates a duplicate node error.
    pub fn duplicate_node(metric: impl Into<String>, field: impl Into<String>) -> Self {
        Self::DuplicateNode {
            metric: metric.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid tags error.
    pub fn invalid_tags(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTags {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid status code error.
    pub fn invalid_status_code(value: impl Into<String>) -> Self {
        Self::InvalidStatusCode { value: value.into() }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid security policy error.
    pub fn invalid_security_policy(policy: impl Into<String>) -> Self {
        Self::InvalidSecurityPolicy {
            policy: policy.into(),
        }
    }

    /// Creates an invalid security mode error.
    pub fn invalid_security_mode(mode: impl Into<String>) -> Self {
        Self::InvalidSecurityMode { mode: mode.into() }
    }

    /// Creates an invalid security combination error.
    pub fn invalid_security(message: impl Into<String>) -> Self {
        Self::InvalidSecurity {
            message: message.into(),
        }
    }

    /// Creates an invalid auth method error.
    pub fn invalid_auth_method(method: impl Into<String>) -> Self {
        Self::InvalidAuthMethod {
            method: method.into(),
        }
    }

    /// Creates an invalid timeout error.
    pub fn invalid_timeout(name: &'static str, duration: Duration, reason: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            name,
            duration,
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidNode { .. } => ErrorCode::new(1, 1),
            Self::EmptyName { .. } => ErrorCode::new(1, 2),
            Self::DuplicateNode { .. } => ErrorCode::new(1, 3),
            Self::InvalidTags { .. } => ErrorCode::new(1, 4),
            Self::InvalidStatusCode { .. } => ErrorCode::new(1, 5),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 6),
            Self::InvalidSecurityPolicy { .. } => ErrorCode::new(1, 7),
            Self::InvalidSecurityMode { .. } => ErrorCode::new(1, 8),
            Self::InvalidSecurity { .. } => ErrorCode::new(1, 9),
            Self::InvalidAuthMethod { .. } => ErrorCode::new(1, 10),
            Self::InvalidTimeout { .. } => ErrorCode::new(1, 11),
            Self::NotInitialized => ErrorCode::new(1, 12),
        }
    }
}

// =============================================================================
// AuthenticationError
// =============================================================================

/// Credential errors for the configured authentication method.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// UserName auth without a username.
    #[error("Auth method UserName requires a non-empty username")]
    MissingUsername,

    /// Certificate auth without a certificate path.
    #[error("Auth method Certificate requires a certificate path")]
    MissingCertificate,

    /// Certificate auth without a private key path.
    #[error("Auth method Certificate requires a private key path")]
    MissingPrivateKey,

    /// A credential file cannot be read.
    #[error("Cannot read {what} '{path}': {source}")]
    Unreadable {
        /// `certificate` or `private key`.
        what: &'static str,
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A credential file is not well-formed.
    #[error("Malformed {what} '{path}': {reason}")]
    Malformed {
        /// `certificate` or `private key`.
        what: &'static str,
        /// File path.
        path: PathBuf,
        /// Reason.
        reason: String,
    },

    /// No endpoint advertises a user token policy for the method.
    #[error("Server does not accept {method} user tokens")]
    TokenNotAccepted {
        /// Method name.
        method: String,
    },

    /// The server rejected the identity during session activation.
    #[error("Server rejected identity: {message}")]
    Rejected {
        /// Server message or status.
        message: String,
    },
}

impl AuthenticationError {
    /// Creates an unreadable file error.
    pub fn unreadable(what: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Unreadable {
            what,
            path: path.into(),
            source,
        }
    }

    /// Creates a malformed file error.
    pub fn malformed(what: &'static str, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a token-not-accepted error.
    pub fn token_not_accepted(method: impl Into<String>) -> Self {
        Self::TokenNotAccepted {
            method: method.into(),
        }
    }

    /// Creates a rejected error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingUsername => ErrorCode::new(2, 1),
            Self::MissingCertificate => ErrorCode::new(2, 2),
            Self::MissingPrivateKey => ErrorCode::new(2, 3),
            Self::Unreadable { .. } => ErrorCode::new(2, 4),
            Self::Malformed { .. } => ErrorCode::new(2, 5),
            Self::TokenNotAccepted { .. } => ErrorCode::new(2, 6),
            Self::Rejected { .. } => ErrorCode::new(2, 7),
        }
    }
}

// =============================================================================
// NegotiationError
// =============================================================================

/// The server does not offer what the client asked for.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The server returned no endpoints at all.
    #[error("Server at '{endpoint}' advertises no endpoints")]
    NoEndpoints {
        /// Endpoint URL.
        endpoint: String,
    },

    /// The explicit policy is not advertised.
    #[error("Security policy '{policy}' is not advertised by the server (available: {advertised})")]
    PolicyNotAdvertised {
        /// Requested policy.
        policy: String,
        /// Comma-separated advertised policies.
        advertised: String,
    },

    /// No endpoint matches the requested policy and mode.
    #[error("No endpoint offers security policy '{policy}' with mode '{mode}'")]
    NoSuitableEndpoint {
        /// Requested policy (or `auto`).
        policy: String,
        /// Requested mode (or `auto`).
        mode: String,
    },
}

impl NegotiationError {
    /// Creates a no-endpoints error.
    pub fn no_endpoints(endpoint: impl Into<String>) -> Self {
        Self::NoEndpoints {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a policy-not-advertised error.
    pub fn policy_not_advertised(policy: impl Into<String>, advertised: impl Into<String>) -> Self {
        Self::PolicyNotAdvertised {
            policy: policy.into(),
            advertised: advertised.into(),
        }
    }

    /// Creates a no-suitable-endpoint error.
    pub fn no_suitable_endpoint(policy: impl Into<String>, mode: impl Into<String>) -> Self {
        Self::NoSuitableEndpoint {
            policy: policy.into(),
            mode: mode.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NoEndpoints { .. } => ErrorCode::new(3, 1),
            Self::PolicyNotAdvertised { .. } => ErrorCode::new(3, 2),
            Self::NoSuitableEndpoint { .. } => ErrorCode::new(3, 3),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Connection refused or handshake failed.
    #[error("Connection to '{endpoint}' failed: {reason}")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Reason.
        reason: String,
    },

    /// Endpoint discovery failed.
    #[error("Cannot get endpoints from '{endpoint}': {reason}")]
    EndpointDiscovery {
        /// Target endpoint.
        endpoint: String,
        /// Reason.
        reason: String,
    },

    /// The session was closed underneath the client.
    #[error("Connection closed: {reason}")]
    Closed {
        /// Reason.
        reason: String,
    },

    /// No open session.
    #[error("Not connected to OPC UA server")]
    NotConnected,

    /// Failure inside the protocol library.
    #[error("Transport error: {message}")]
    Transport {
        /// Message.
        message: String,
    },
}

impl ConnectionError {
    /// Creates a refused error.
    pub fn refused(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates an endpoint discovery error.
    pub fn endpoint_discovery(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EndpointDiscovery {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(4, 1),
            Self::EndpointDiscovery { .. } => ErrorCode::new(4, 2),
            Self::Closed { .. } => ErrorCode::new(4, 3),
            Self::NotConnected => ErrorCode::new(4, 4),
            Self::Transport { .. } => ErrorCode::new(4, 5),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// Timeout errors.
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// Handshake (endpoint discovery, channel and session setup) timed out.
    #[error("Connecting to '{endpoint}' timed out after {duration:?}")]
    Connect {
        /// Target endpoint.
        endpoint: String,
        /// Timeout duration.
        duration: Duration,
    },

    /// A request on an open session timed out.
    #[error("{operation} request timed out after {duration:?}")]
    Request {
        /// Request kind (`read`, `register nodes`).
        operation: &'static str,
        /// Timeout duration.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Creates a connect timeout.
    pub fn connect(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            duration,
        }
    }

    /// Creates a request timeout.
    pub fn request(operation: &'static str, duration: Duration) -> Self {
        Self::Request { operation, duration }
    }

    /// Returns the timeout duration.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Connect { duration, .. } | Self::Request { duration, .. } => *duration,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connect { .. } => ErrorCode::new(5, 1),
            Self::Request { .. } => ErrorCode::new(5, 2),
        }
    }
}

// =============================================================================
// ReadError
// =============================================================================

/// A read cycle failed as a whole.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The read service itself returned a bad status.
    #[error("Read service failed with {status}")]
    Service {
        /// Service-level status.
        status: StatusCode,
    },

    /// The response does not line up with the request.
    #[error("Read returned {actual} results for {expected} nodes")]
    ResultCountMismatch {
        /// Requested node count.
        expected: usize,
        /// Returned result count.
        actual: usize,
    },

    /// Other failure reported by the transport.
    #[error("Read failed: {message}")]
    Failed {
        /// Message.
        message: String,
    },
}

impl ReadError {
    /// Creates a service error.
    pub fn service(status: impl Into<StatusCode>) -> Self {
        Self::Service {
            status: status.into(),
        }
    }

    /// Creates a count mismatch error.
    pub fn result_count_mismatch(expected: usize, actual: usize) -> Self {
        Self::ResultCountMismatch { expected, actual }
    }

    /// Creates a generic read failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Service { .. } => ErrorCode::new(6, 1),
            Self::ResultCountMismatch { .. } => ErrorCode::new(6, 2),
            Self::Failed { .. } => ErrorCode::new(6, 3),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `UA-XXYY` where XX is the category and YY the specific error.
///
/// Categories:
/// - 1: Configuration
/// - 2: Authentication
/// - 3: Security negotiation
/// - 4: Connection
/// - 5: Timeout
/// - 6: Read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-6).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// Tests
// =============================================================================
