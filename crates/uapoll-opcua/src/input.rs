// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The OPC UA input: one configured server, polled once per `gather`.
//!
//! # Lifecycle
//!
//! ```text
//! new ─► init ─► gather ─► gather ─► ... ─► stop
//!         │        │
//!         │        └─ connects lazily, reconnects after a total failure
//!         └─ validates settings, builds mappings (fatal on error)
//! ```

use chrono::Utc;
use tracing::{debug, info, warn};
use uapoll_core::Accumulator;

use crate::client::{Session, SessionManager, SessionSettings, TransportFactory};
use crate::config::ReadClientConfig;
use crate::emit::emit_metrics;
use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::mapping::{build_mappings, NodeMetricMapping};
use crate::read::{NodeValue, ReadExecutor, ReadStats, ReadStatsSnapshot};
use crate::status::StatusCodeGate;

// =============================================================================
// OpcUaInput
// =============================================================================

/// A polling read client for one server.
///
/// The input owns its session exclusively. It is driven by one caller at
/// a time (`gather` takes `&mut self`), so cycles never overlap.
pub struct OpcUaInput<F: TransportFactory> {
    config: ReadClientConfig,
    manager: SessionManager<F>,
    session: Option<Session<F::Transport>>,
    executor: Option<ReadExecutor>,
    mappings: Vec<NodeMetricMapping>,
    last_received: Vec<NodeValue>,
    ever_connected: bool,
    stats: ReadStats,
}

impl<F: TransportFactory> OpcUaInput<F> {
    /// Creates an uninitialized input.
    pub fn new(config: ReadClientConfig, factory: F) -> Self {
        let manager = SessionManager::new(factory, SessionSettings::from_config(&config));
        Self {
            config,
            manager,
            session: None,
            executor: None,
            mappings: Vec::new(),
            last_received: Vec::new(),
            ever_connected: false,
            stats: ReadStats::new(),
        }
    }

    /// Validates the configuration and builds the node mappings.
    ///
    /// Does no network I/O. Any error here means the input must not run.
    pub fn init(&mut self) -> OpcUaResult<()> {
        self.config.validate()?;
        let gate = StatusCodeGate::parse(self.config.workarounds.additional_valid_status_codes.as_slice())?;
        let mappings = build_mappings(&self.config)?;

        info!(
            input = %self.config.metric_name,
            endpoint = %self.config.endpoint,
            nodes = mappings.len(),
            unregistered_reads = self.config.read_workarounds.use_unregistered_reads,
            extra_valid_codes = gate.additional().len(),
            "Input initialized"
        );

        self.executor = Some(ReadExecutor::new(gate, self.config.read_workarounds));
        self.mappings = mappings;
        self.last_received.clear();
        Ok(())
    }

    /// Runs one collection cycle.
    ///
    /// On success the freshly read values are emitted to `acc` and the
    /// number of metrics is returned. On a total failure the error is
    /// reported to `acc` once, the previous values are kept, and the
    /// session is dropped so the next cycle reconnects.
    pub async fn gather<A: Accumulator + ?Sized>(&mut self, acc: &mut A) -> OpcUaResult<usize> {
        let cycle_start = Utc::now();

        match self.read_cycle().await {
            Ok(()) => Ok(emit_metrics(&self.mappings, &self.last_received, cycle_start, acc)),
            Err(e) => {
                e.log(&self.config.metric_name);
                acc.add_error(&e);
                Err(e)
            }
        }
    }

    async fn read_cycle(&mut self) -> OpcUaResult<()> {
        let executor = self
            .executor
            .as_mut()
            .ok_or_else(|| OpcUaError::configuration(ConfigurationError::NotInitialized))?;
        self.stats.record_cycle();

        if self.mappings.is_empty() {
            self.last_received.clear();
            return Ok(());
        }

        let reusable = matches!(&self.session, Some(session) if session.is_open());
        if !reusable {
            if let Some(mut stale) = self.session.take() {
                debug!(endpoint = %self.config.endpoint, "Discarding dead session");
                stale.close().await.ok();
            }
            match self.manager.connect().await {
                Ok(session) => {
                    if self.ever_connected {
                        self.stats.record_reconnect();
                    }
                    self.ever_connected = true;
                    self.session = Some(session);
                }
                Err(e) => {
                    self.stats.record_failure();
                    return Err(e);
                }
            }
        }

        let session = self.session.as_mut().ok_or_else(OpcUaError::not_connected)?;
        match executor.read_all(session, &self.mappings).await {
            Ok(values) => {
                self.stats.record_success(&values);
                self.last_received = values;
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure();
                if e.requires_reconnect() {
                    if let Some(mut session) = self.session.take() {
                        session.close().await.ok();
                    }
                    warn!(endpoint = %self.config.endpoint, error = %e, "Read cycle failed, reconnecting next cycle");
                }
                Err(e)
            }
        }
    }

    /// Closes the session, if any. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Error while closing session");
            }
        }
        let stats = self.stats.snapshot();
        info!(
            input = %self.config.metric_name,
            cycles = stats.cycles,
            failed_cycles = stats.failed_cycles,
            reconnects = stats.reconnects,
            "Input stopped"
        );
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration.
    pub fn config(&self) -> &ReadClientConfig {
        &self.config
    }

    /// Input name for logs (the root metric name).
    pub fn name(&self) -> &str {
        &self.config.metric_name
    }

    /// The mappings built by `init`.
    pub fn mappings(&self) -> &[NodeMetricMapping] {
        &self.mappings
    }

    /// The values of the last successful cycle, index-aligned with
    /// [`mappings`](Self::mappings).
    pub fn last_received(&self) -> &[NodeValue] {
        &self.last_received
    }

    /// Returns `true` while a session is open.
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().map(Session::is_open).unwrap_or(false)
    }

    /// Read statistics.
    pub fn stats(&self) -> ReadStatsSnapshot {
        self.stats.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================
