// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Collect until interrupted
//! - `once`: Gather every input once and print the measurements
//! - `validate`: Validate configuration file
//! - `version`: Show version information

mod once;
mod run;
mod validate;
mod version;

pub use once::once;
pub use run::run;
pub use validate::validate;
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Once => once::once(&cli).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}

/// The transport factory used by `run` and `once`.
#[cfg(feature = "real-transport")]
pub(crate) fn default_factory() -> BinResult<uapoll_opcua::RealTransportFactory> {
    Ok(uapoll_opcua::RealTransportFactory)
}

/// The transport factory used by `run` and `once`.
#[cfg(not(feature = "real-transport"))]
pub(crate) fn default_factory() -> BinResult<uapoll_opcua::client::mock::MockTransportFactory> {
    Err(crate::error::BinError::startup(
        "built without the real-transport feature; no OPC UA stack is available",
    ))
}
