// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! uapoll - OPC UA polling agent
//!
//! Main binary entry point.

use anyhow::Context;

use uapoll_bin::error::report_error_and_exit;
use uapoll_bin::{commands, init_logging, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.effective_log_level(), cli.log_format).context("failed to initialize logging")?;

    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
    Ok(())
}
