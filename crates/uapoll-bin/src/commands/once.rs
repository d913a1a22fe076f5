// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `once` command.

use crate::cli::Cli;
use crate::commands::default_factory;
use crate::error::{BinError, BinResult};
use crate::output::JsonLinesAccumulator;
use crate::runtime::CollectionRuntime;

/// Gathers every input once and prints the measurements.
///
/// Fails if any input's cycle failed.
pub async fn once(cli: &Cli) -> BinResult<()> {
    let config = uapoll_config::load_config(&cli.config)
        .map_err(|e| BinError::from(e).context(format!("loading {}", cli.config.display())))?;

    let runtime = CollectionRuntime::new(config, default_factory()?);
    let mut acc = JsonLinesAccumulator::stdout();
    let report = runtime.once(&mut acc).await?;

    if report.is_success() {
        Ok(())
    } else {
        Err(BinError::collection(format!(
            "{} input(s) failed: {}",
            report.failed.len(),
            report.failed.join(", ")
        )))
    }
}
