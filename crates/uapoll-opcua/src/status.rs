// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA status codes and the validity gate.
//!
//! [`StatusCodeGate`] decides whether a per-node result counts as a value.
//! It only looks at the code; decoding the value is a separate step in
//! [`crate::read`], so extending the allowlist never touches decoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

// =============================================================================
// StatusCode
// =============================================================================

/// A raw 32-bit OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// The canonical good code.
    pub const GOOD: StatusCode = StatusCode(0);

    const SEVERITY_MASK: u32 = 0xC000_0000;
    const UNCERTAIN: u32 = 0x4000_0000;
    const BAD: u32 = 0x8000_0000;

    /// Returns the raw bits.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` for exactly the canonical good code.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the severity bits say uncertain.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == Self::UNCERTAIN
    }

    /// Returns `true` if the severity bits say bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == Self::BAD
    }

    /// Returns the symbolic name, or `None` for codes not in the table.
    pub fn name(&self) -> Option<&'static str> {
        status_code_name(self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl FromStr for StatusCode {
    type Err = ConfigurationError;

    /// Parses `0x`-prefixed hex or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => trimmed.parse::<u32>(),
        };

        parsed
            .map(StatusCode)
            .map_err(|_| ConfigurationError::invalid_status_code(s))
    }
}

/// Returns the human-readable name for common OPC UA status codes.
pub fn status_code_name(code: u32) -> Option<&'static str> {
    let name = match code {
        0x0000_0000 => "Good",
        0x4000_0000 => "Uncertain",
        0x8000_0000 => "Bad",
        0x8001_0000 => "BadUnexpectedError",
        0x8002_0000 => "BadInternalError",
        0x8003_0000 => "BadOutOfMemory",
        0x8004_0000 => "BadResourceUnavailable",
        0x8005_0000 => "BadCommunicationError",
        0x8006_0000 => "BadEncodingError",
        0x8007_0000 => "BadDecodingError",
        0x800A_0000 => "BadTimeout",
        0x800B_0000 => "BadServiceUnsupported",
        0x800C_0000 => "BadShutdown",
        0x800D_0000 => "BadServerNotConnected",
        0x800E_0000 => "BadServerHalted",
        0x800F_0000 => "BadNothingToDo",
        0x8010_0000 => "BadTooManyOperations",
        0x801F_0000 => "BadUserAccessDenied",
        0x8020_0000 => "BadIdentityTokenInvalid",
        0x8021_0000 => "BadIdentityTokenRejected",
        0x8022_0000 => "BadSecureChannelIdInvalid",
        0x8025_0000 => "BadSessionIdInvalid",
        0x8026_0000 => "BadSessionClosed",
        0x8027_0000 => "BadSessionNotActivated",
        0x8032_0000 => "BadWaitingForInitialData",
        0x8033_0000 => "BadNodeIdInvalid",
        0x8034_0000 => "BadNodeIdUnknown",
        0x8035_0000 => "BadAttributeIdInvalid",
        0x803A_0000 => "BadNotReadable",
        0x8074_0000 => "BadTypeMismatch",
        _ => return None,
    };
    Some(name)
}

// =============================================================================
// StatusCodeGate
// =============================================================================

/// Pure predicate deciding whether a per-node status yields a value.
///
/// A status passes if it is the canonical good code or appears in the
/// configured allowlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCodeGate {
    additional: Vec<StatusCode>,
}

impl StatusCodeGate {
    /// Creates a gate with an allowlist.
    pub fn new(additional: impl IntoIterator<Item = StatusCode>) -> Self {
        let mut additional: Vec<StatusCode> = additional.into_iter().collect();
        additional.sort_unstable();
        additional.dedup();
        Self { additional }
    }

    /// Parses allowlist entries from configuration strings.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ConfigurationError> {
        let codes = entries
            .iter()
            .map(|entry| entry.as_ref().parse::<StatusCode>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(codes))
    }

    /// Returns `true` if `status` counts as success.
    #[inline]
    pub fn accepts(&self, status: StatusCode) -> bool {
        status.is_good() || self.additional.binary_search(&status).is_ok()
    }

    /// The allowlisted codes, sorted.
    pub fn additional(&self) -> &[StatusCode] {
        &self.additional
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_and_decimal() {
        assert_eq!("0xC0".parse::<StatusCode>().unwrap(), StatusCode(0xC0));
        assert_eq!("0X80340000".parse::<StatusCode>().unwrap(), StatusCode(0x8034_0000));
        assert_eq!("192".parse::<StatusCode>().unwrap(), StatusCode(192));
        assert_eq!(" 7 ".parse::<StatusCode>().unwrap(), StatusCode(7));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("0xZZ".parse::<StatusCode>().is_err());
        assert!("-1".parse::<StatusCode>().is_err());
        assert!("".parse::<StatusCode>().is_err());
        assert!("0x1_0000_0000".parse::<StatusCode>().is_err());
    }

    #[test]
    fn test_severity_bits() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode(0x8034_0000).is_bad());
        assert!(StatusCode(0x4000_0000).is_uncertain());
        assert!(!StatusCode(0x4000_0000).is_good());
    }

    #[test]
    fn test_display_uses_names() {
        assert_eq!(
            StatusCode(0x8034_0000).to_string(),
            "BadNodeIdUnknown (0x80340000)"
        );
        assert_eq!(StatusCode(0xC0).to_string(), "0x000000C0");
    }

    #[test]
    fn test_gate_accepts_good_and_allowlisted() {
        let gate = StatusCodeGate::parse(&["0xC0", "1073741824"]).unwrap();
        assert!(gate.accepts(StatusCode::GOOD));
        assert!(gate.accepts(StatusCode(0xC0)));
        assert!(gate.accepts(StatusCode(0x4000_0000)));
        assert!(!gate.accepts(StatusCode(0x8034_0000)));
        assert!(!gate.accepts(StatusCode(0xC1)));
    }

    #[test]
    fn test_gate_default_only_good() {
        let gate = StatusCodeGate::default();
        assert!(gate.accepts(StatusCode(0)));
        assert!(!gate.accepts(StatusCode(0x4000_0000)));
        assert!(gate.additional().is_empty());
    }

    #[test]
    fn test_gate_parse_error_names_entry() {
        let err = StatusCodeGate::parse(&["0xC0", "bogus"]).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}
