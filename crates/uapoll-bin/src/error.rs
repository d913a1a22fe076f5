// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Agent-level errors and process exit codes.
//!
//! | Exit | Meaning                                   |
//! |------|-------------------------------------------|
//! | 1    | configuration rejected                    |
//! | 2    | an input or the logger could not start    |
//! | 3    | a collection pass failed (`once`)         |
//! | 4    | stdout or another output is unusable      |
//! | 5    | protocol error outside a collection cycle |

use thiserror::Error;

use uapoll_config::ConfigError;
use uapoll_opcua::OpcUaError;

/// Result type alias for agent operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors surfaced by the `uapoll` binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Loading the configuration file failed.
    #[error(transparent)]
    Load(#[from] ConfigError),

    /// Something needed before collection could not be set up.
    #[error("startup failed: {0}")]
    Startup(String),

    /// A collection pass did not complete.
    #[error("collection failed: {0}")]
    Collection(String),

    /// Writing results failed.
    #[error("output error: {0}")]
    Output(String),

    /// A protocol error.
    #[error("[{code}] {0}", code = .0.error_code())]
    Input(#[from] OpcUaError),

    /// Another error, with what the agent was doing at the time.
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Invalid configuration.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Startup failure.
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Collection failure.
    pub fn collection(msg: impl Into<String>) -> Self {
        Self::Collection(msg.into())
    }

    /// Wraps the error with what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::Load(_) => 1,
            Self::Input(e) if e.category() == "configuration" => 1,
            Self::Startup(_) => 2,
            Self::Collection(_) => 3,
            Self::Output(_) => 4,
            Self::Input(_) => 5,
            Self::Context { source, .. } => source.exit_code(),
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Output(err.to_string())
    }
}

// =============================================================================
// Reporting
// =============================================================================

/// Writes the error and its causes to stderr, one per line.
pub fn report_error(error: &BinError) {
    eprintln!("uapoll: {}", error);

    let mut cause = std::error::Error::source(error);
    while let Some(inner) = cause {
        eprintln!("  caused by: {}", inner);
        cause = inner.source();
    }
}

/// Reports the error and terminates the process with its exit code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uapoll_opcua::{ConfigurationError, TimeoutError};

    #[test]
    fn test_context_keeps_exit_code() {
        let err = BinError::invalid_config("interval is zero").context("loading uapoll.toml");
        assert_eq!(err.to_string(), "loading uapoll.toml: invalid configuration: interval is zero");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::startup("x").exit_code(), 2);
        assert_eq!(BinError::collection("x").exit_code(), 3);
        assert_eq!(BinError::from(std::io::Error::other("broken pipe")).exit_code(), 4);
        assert_eq!(BinError::Load(ConfigError::file_not_found("uapoll.toml")).exit_code(), 1);
    }

    #[test]
    fn test_protocol_errors() {
        let invalid: BinError = OpcUaError::configuration(ConfigurationError::NotInitialized).into();
        assert_eq!(invalid.exit_code(), 1);

        let timeout: BinError = OpcUaError::timeout(TimeoutError::request("Read", Duration::from_secs(5))).into();
        assert_eq!(timeout.exit_code(), 5);
        assert!(timeout.to_string().starts_with("[UA-"));
    }
}
