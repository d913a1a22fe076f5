// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::commands::default_factory;
use crate::error::{BinError, BinResult};
use crate::output::JsonLinesAccumulator;
use crate::runtime::CollectionRuntime;

/// Executes the `run` command: collect until a shutdown signal.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let config = uapoll_config::load_config(&cli.config)
        .map_err(|e| BinError::from(e).context(format!("loading {}", cli.config.display())))?;

    let mut runtime = CollectionRuntime::new(config, default_factory()?);
    if let Some(interval) = args.interval {
        runtime = runtime.with_interval(interval);
    }

    let acc = Arc::new(Mutex::new(JsonLinesAccumulator::stdout()));
    let summaries = runtime.run(acc.clone()).await?;

    let out = acc.lock();
    info!(
        metrics = out.metrics_written(),
        errors = out.errors_seen(),
        "Agent stopped"
    );
    for summary in &summaries {
        info!(
            input = %summary.name,
            cycles = summary.stats.cycles,
            failed_cycles = summary.stats.failed_cycles,
            reconnects = summary.stats.reconnects,
            "Input summary"
        );
    }

    Ok(())
}
