// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA addressing and security types.
//!
//! - **NodeId**: the four node identifier kinds with parsing and formatting
//! - **IdentifierType**: the `i`/`s`/`g`/`b` codes used in configuration
//! - **SecurityPolicy/SecurityMode**: concrete security settings with URIs
//! - **SecurityPolicySetting/SecurityModeSetting**: configured value, `auto` or explicit
//! - **AuthMethod**: the configured user identity kind
//!
//! # Examples
//!
//! ```
//! use uapoll_opcua::types::{IdentifierType, NodeId};
//!
//! let node = NodeId::new(2, IdentifierType::Numeric.parse_identifier("1001").unwrap());
//! assert_eq!(node.to_opc_string(), "ns=2;i=1001");
//!
//! let parsed: NodeId = "ns=3;s=Line1.Speed".parse().unwrap();
//! assert_eq!(parsed.namespace_index, 3);
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// A namespace index plus a numeric, string, GUID or opaque identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a node ID from its parts.
    #[inline]
    pub fn new(namespace_index: u16, identifier: NodeIdentifier) -> Self {
        Self {
            namespace_index,
            identifier,
        }
    }

    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self::new(namespace_index, NodeIdentifier::Numeric(value))
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self::new(namespace_index, NodeIdentifier::String(value.into()))
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self::new(namespace_index, NodeIdentifier::Guid(value))
    }

    /// Creates an opaque node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: impl Into<Vec<u8>>) -> Self {
        Self::new(namespace_index, NodeIdentifier::Opaque(value.into()))
    }

    /// Returns the identifier type.
    pub fn identifier_type(&self) -> IdentifierType {
        self.identifier.identifier_type()
    }

    /// Formats as `ns=<index>;<type>=<value>`.
    pub fn to_opc_string(&self) -> String {
        format!("ns={};{}", self.namespace_index, self.identifier)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=2;i=1001`, `ns=2;s=Name`, `ns=2;g=<uuid>`, `ns=2;b=<base64>`,
    /// or the same without the `ns=` prefix for namespace 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| OpcUaError::configuration(ConfigurationError::invalid_node(s, reason));

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("missing identifier after namespace".into()))?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| invalid(format!("invalid namespace index '{}'", ns_str)))?;
                (ns, id)
            }
            None => (0, s),
        };

        let (code, raw) = identifier_part
            .split_once('=')
            .ok_or_else(|| invalid("expected i=, s=, g=, or b=".into()))?;
        let id_type: IdentifierType = code
            .parse()
            .map_err(|_| invalid(format!("unknown identifier type '{}'", code)))?;
        let identifier = id_type.parse_identifier(raw).map_err(invalid)?;

        Ok(Self::new(namespace_index, identifier))
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier (byte string).
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    /// Returns the identifier type.
    pub const fn identifier_type(&self) -> IdentifierType {
        match self {
            Self::Numeric(_) => IdentifierType::Numeric,
            Self::String(_) => IdentifierType::String,
            Self::Guid(_) => IdentifierType::Guid,
            Self::Opaque(_) => IdentifierType::Opaque,
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// IdentifierType
// =============================================================================

/// Identifier type code as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierType {
    /// `i`
    #[serde(rename = "i")]
    Numeric,
    /// `s`
    #[serde(rename = "s")]
    String,
    /// `g`
    #[serde(rename = "g")]
    Guid,
    /// `b`
    #[serde(rename = "b")]
    Opaque,
}

impl IdentifierType {
    /// Returns the one-letter code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Numeric => "i",
            Self::String => "s",
            Self::Guid => "g",
            Self::Opaque => "b",
        }
    }

    /// Interprets raw identifier text according to this type.
    ///
    /// The error is a human-readable reason.
    pub fn parse_identifier(&self, raw: &str) -> Result<NodeIdentifier, String> {
        if raw.is_empty() {
            return Err("empty identifier".to_string());
        }
        match self {
            Self::Numeric => raw
                .parse::<u32>()
                .map(NodeIdentifier::Numeric)
                .map_err(|_| format!("numeric identifier '{}' is not a u32", raw)),
            Self::String => Ok(NodeIdentifier::String(raw.to_string())),
            Self::Guid => Uuid::parse_str(raw)
                .map(NodeIdentifier::Guid)
                .map_err(|e| format!("invalid GUID '{}': {}", raw, e)),
            Self::Opaque => BASE64
                .decode(raw)
                .map(NodeIdentifier::Opaque)
                .map_err(|e| format!("invalid base64 '{}': {}", raw, e)),
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for IdentifierType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i" => Ok(Self::Numeric),
            "s" => Ok(Self::String),
            "g" => Ok(Self::Guid),
            "b" => Ok(Self::Opaque),
            other => Err(format!("invalid identifier type '{}' (expected i, s, g or b)", other)),
        }
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns `true` if this mode provides no security.
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Ordering used by negotiation; higher is stronger.
    pub const fn strength(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Sign => 1,
            Self::SignAndEncrypt => 2,
        }
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "sign" => Ok(Self::Sign),
            "signandencrypt" => Ok(Self::SignAndEncrypt),
            _ => Err(ConfigurationError::invalid_security_mode(s)),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecurityPolicy {
    /// No security.
    None,

    /// Basic128Rsa15 (deprecated).
    Basic128Rsa15,

    /// Basic256 (deprecated).
    Basic256,

    /// Basic256Sha256.
    Basic256Sha256,

    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,

    /// Aes256_Sha256_RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// All policies, weakest first.
    pub const ALL: [SecurityPolicy; 6] = [
        Self::None,
        Self::Basic128Rsa15,
        Self::Basic256,
        Self::Basic256Sha256,
        Self::Aes128Sha256RsaOaep,
        Self::Aes256Sha256RsaPss,
    ];

    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128_Sha256_RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256_Sha256_RsaPss",
        }
    }

    /// Ordering used by negotiation; higher is stronger.
    pub const fn strength(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Basic128Rsa15 => 1,
            Self::Basic256 => 2,
            Self::Basic256Sha256 => 3,
            Self::Aes128Sha256RsaOaep => 4,
            Self::Aes256Sha256RsaPss => 5,
        }
    }

    /// Returns `true` if this policy is deprecated.
    #[inline]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::Basic128Rsa15 | Self::Basic256)
    }

    /// Creates from URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|policy| policy.uri() == uri)
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(policy) = Self::from_uri(s) {
            return Ok(policy);
        }

        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "basic128rsa15" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(ConfigurationError::invalid_security_policy(s)),
        }
    }
}

// =============================================================================
// Configured security settings
// =============================================================================

/// Configured security policy: `auto` or a concrete policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecurityPolicySetting {
    /// Pick the strongest policy the server advertises.
    #[default]
    Auto,
    /// Use exactly this policy.
    Explicit(SecurityPolicy),
}

impl SecurityPolicySetting {
    /// Returns `true` if `policy` satisfies this setting.
    pub fn matches(&self, policy: SecurityPolicy) -> bool {
        match self {
            Self::Auto => true,
            Self::Explicit(p) => *p == policy,
        }
    }
}

impl fmt::Display for SecurityPolicySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(p) => write!(f, "{}", p),
        }
    }
}

impl FromStr for SecurityPolicySetting {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse().map(Self::Explicit)
    }
}

impl TryFrom<String> for SecurityPolicySetting {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecurityPolicySetting> for String {
    fn from(value: SecurityPolicySetting) -> Self {
        value.to_string()
    }
}

/// Configured security mode: `auto` or a concrete mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecurityModeSetting {
    /// Pick the strongest mode the server advertises.
    #[default]
    Auto,
    /// Use exactly this mode.
    Explicit(SecurityMode),
}

impl SecurityModeSetting {
    /// Returns `true` if `mode` satisfies this setting.
    pub fn matches(&self, mode: SecurityMode) -> bool {
        match self {
            Self::Auto => true,
            Self::Explicit(m) => *m == mode,
        }
    }
}

impl fmt::Display for SecurityModeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(m) => write!(f, "{}", m),
        }
    }
}

impl FromStr for SecurityModeSetting {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse().map(Self::Explicit)
    }
}

impl TryFrom<String> for SecurityModeSetting {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecurityModeSetting> for String {
    fn from(value: SecurityModeSetting) -> Self {
        value.to_string()
    }
}

/// Rejects explicit combinations no server can offer.
pub fn validate_security_pair(
    policy: SecurityPolicySetting,
    mode: SecurityModeSetting,
) -> Result<(), ConfigurationError> {
    match (policy, mode) {
        (SecurityPolicySetting::Explicit(p), SecurityModeSetting::Explicit(m))
            if p == SecurityPolicy::None && !m.is_none() =>
        {
            Err(ConfigurationError::invalid_security(format!(
                "security mode {} requires a security policy other than None",
                m
            )))
        }
        (SecurityPolicySetting::Explicit(p), SecurityModeSetting::Explicit(m))
            if p != SecurityPolicy::None && m.is_none() =>
        {
            Err(ConfigurationError::invalid_security(format!(
                "security policy {} requires mode Sign or SignAndEncrypt",
                p
            )))
        }
        _ => Ok(()),
    }
}

// =============================================================================
// AuthMethod
// =============================================================================

/// How the client identifies its user to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthMethod {
    /// No credentials.
    #[default]
    Anonymous,
    /// Username and password.
    UserName,
    /// X.509 certificate and private key.
    Certificate,
}

impl AuthMethod {
    /// Returns the configuration spelling.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::UserName => "UserName",
            Self::Certificate => "Certificate",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuthMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "anonymous" => Ok(Self::Anonymous),
            "username" => Ok(Self::UserName),
            "certificate" => Ok(Self::Certificate),
            _ => Err(ConfigurationError::invalid_auth_method(s)),
        }
    }
}

impl TryFrom<String> for AuthMethod {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthMethod> for String {
    fn from(value: AuthMethod) -> Self {
        value.name().to_string()
    }
}

// =============================================================================
// Serde Helpers
// =============================================================================

/// Humantime serialization for Duration.
pub(crate) mod humantime_serde {
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

// =============================================================================
// Tests
// =============================================================================
