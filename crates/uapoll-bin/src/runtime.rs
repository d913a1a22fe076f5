// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Agent runtime orchestration.
//!
//! One task per configured input. Each task ticks on the agent interval,
//! runs one gather per tick and stops on shutdown:
//!
//! ```text
//!   ┌──────────┐   tick    ┌──────────┐  metrics  ┌─────────────┐
//!   │ interval │──────────▶│  gather  │──────────▶│ accumulator │
//!   └──────────┘           └────┬─────┘           └─────────────┘
//!        ▲                      │ shutdown
//!        └──────────────────────┴──────────▶ stop() and exit
//! ```
//!
//! Cycles of one input never overlap; a tick that arrives while a cycle is
//! still running is skipped.

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use uapoll_config::AgentConfig;
use uapoll_core::{Accumulator, SharedAccumulator};
use uapoll_opcua::{OpcUaInput, ReadStatsSnapshot, TransportFactory};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// Summaries
// =============================================================================

/// Final state of one input after the runtime stopped.
#[derive(Debug, Clone, Serialize)]
pub struct InputSummary {
    /// Root metric name of the input.
    pub name: String,
    /// Server endpoint.
    pub endpoint: String,
    /// Read counters at stop time.
    pub stats: ReadStatsSnapshot,
}

/// Result of a single collection pass over all inputs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OnceReport {
    /// Metrics emitted across all inputs.
    pub metrics: usize,
    /// Names of the inputs whose cycle failed.
    pub failed: Vec<String>,
}

impl OnceReport {
    /// Returns `true` if every input completed its cycle.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// CollectionRuntime
// =============================================================================

/// Drives every configured input on the agent interval.
pub struct CollectionRuntime<F: TransportFactory> {
    config: AgentConfig,
    factory: F,
    interval: Duration,
    shutdown: ShutdownCoordinator,
}

impl<F> CollectionRuntime<F>
where
    F: TransportFactory + Clone + 'static,
{
    /// Creates a runtime for a loaded configuration.
    pub fn new(config: AgentConfig, factory: F) -> Self {
        let interval = config.agent.interval;
        Self {
            config,
            factory,
            interval,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Overrides the collection interval from the configuration.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Uses an existing shutdown coordinator.
    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Returns a handle that can stop [`run`](Self::run).
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// The effective collection interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Creates and initializes every input. Any init error aborts startup.
    fn build_inputs(&self) -> BinResult<Vec<OpcUaInput<F>>> {
        self.config
            .inputs
            .opcua
            .iter()
            .map(|settings| {
                let mut input = OpcUaInput::new(settings.clone(), self.factory.clone());
                input.init().map_err(|e| {
                    BinError::startup(format!("input '{}' ({}): {}", settings.metric_name, settings.endpoint, e))
                })?;
                Ok(input)
            })
            .collect()
    }

    /// Collects until shutdown is signaled.
    pub async fn run<A>(self, acc: SharedAccumulator<A>) -> BinResult<Vec<InputSummary>>
    where
        A: Accumulator + 'static,
    {
        if self.interval.is_zero() {
            return Err(BinError::invalid_config("collection interval must be greater than zero"));
        }

        let inputs = self.build_inputs()?;

        info!(
            version = uapoll_core::VERSION,
            inputs = inputs.len(),
            nodes = self.config.node_count(),
            interval = %humantime::format_duration(self.interval),
            "Starting collection"
        );

        let signal_task = {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for_shutdown().await })
        };

        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                tokio::spawn(collect_loop(
                    input,
                    acc.clone(),
                    self.interval,
                    self.shutdown.clone(),
                ))
            })
            .collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(error = %e, "Collection task failed"),
            }
        }

        signal_task.abort();
        info!(inputs = summaries.len(), "Collection stopped");

        Ok(summaries)
    }

    /// Runs one gather per input, in configuration order, then stops them.
    pub async fn once<A>(&self, acc: &mut A) -> BinResult<OnceReport>
    where
        A: Accumulator + ?Sized,
    {
        let mut report = OnceReport::default();

        for mut input in self.build_inputs()? {
            match input.gather(acc).await {
                Ok(count) => report.metrics += count,
                Err(_) => report.failed.push(input.name().to_string()),
            }
            input.stop().await;
        }

        Ok(report)
    }
}

async fn collect_loop<F, A>(
    mut input: OpcUaInput<F>,
    mut acc: SharedAccumulator<A>,
    period: Duration,
    shutdown: ShutdownCoordinator,
) -> InputSummary
where
    F: TransportFactory,
    A: Accumulator,
{
    let mut stop = shutdown.subscribe();
    let token = shutdown.token();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(input = %input.name(), endpoint = %input.config().endpoint, "Collection task started");

    loop {
        if token.is_shutdown_requested() {
            break;
        }

        tokio::select! {
            biased;
            _ = stop.recv() => break,
            _ = ticker.tick() => {}
        }

        // A cycle in flight at shutdown is abandoned; its partial results are never emitted.
        tokio::select! {
            biased;
            _ = stop.recv() => {
                debug!(input = %input.name(), "Shutdown during cycle");
                break;
            }
            result = input.gather(&mut acc) => {
                if let Ok(count) = result {
                    debug!(input = %input.name(), metrics = count, "Cycle complete");
                }
            }
        }
    }

    input.stop().await;

    InputSummary {
        name: input.name().to_string(),
        endpoint: input.config().endpoint.clone(),
        stats: input.stats(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use uapoll_config::{AgentSettings, InputsConfig};
    use uapoll_core::MemoryAccumulator;
    use uapoll_opcua::client::mock::{MockServer, MockTransportFactory};
    use uapoll_opcua::client::OpcUaValue;
    use uapoll_opcua::{NodeId, NodeSettings, ReadClientConfig};

    fn agent_config(inputs: Vec<ReadClientConfig>) -> AgentConfig {
        AgentConfig {
            agent: AgentSettings {
                interval: Duration::from_millis(20),
            },
            inputs: InputsConfig { opcua: inputs },
        }
    }

    fn line_input(name: &str) -> ReadClientConfig {
        let mut config = ReadClientConfig::new("opc.tcp://localhost:4840");
        config.metric_name = name.to_string();
        config.root_nodes.push(NodeSettings::new("temp", "temp").with_namespace("1").with_identifier_type("s"));
        config
    }

    fn server() -> MockServer {
        let server = MockServer::new();
        server.set_value(NodeId::string(1, "temp"), OpcUaValue::Double(21.5));
        server
    }

    #[tokio::test]
    async fn test_once_gathers_every_input() {
        let server = server();
        let runtime = CollectionRuntime::new(
            agent_config(vec![line_input("line_a"), line_input("line_b")]),
            MockTransportFactory::new(server.clone()),
        );

        let mut acc = MemoryAccumulator::new();
        let report = runtime.once(&mut acc).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.metrics, 2);
        assert!(acc.find("line_a").is_some());
        assert!(acc.find("line_b").is_some());
        assert_eq!(server.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_once_reports_failed_inputs() {
        let server = server();
        server.set_connect_failure(Some("connection refused"));
        let runtime = CollectionRuntime::new(
            agent_config(vec![line_input("line_a")]),
            MockTransportFactory::new(server),
        );

        let mut acc = MemoryAccumulator::new();
        let report = runtime.once(&mut acc).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed, vec!["line_a".to_string()]);
        assert!(acc.is_empty());
        assert_eq!(acc.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_aborts_startup() {
        let mut bad = line_input("line_a");
        bad.root_nodes.push(NodeSettings::new("temp", "other").with_namespace("1").with_identifier_type("s"));
        let runtime = CollectionRuntime::new(agent_config(vec![bad]), MockTransportFactory::new(server()));

        let mut acc = MemoryAccumulator::new();
        let err = runtime.once(&mut acc).await.unwrap_err();
        assert!(matches!(err, BinError::Startup(_)));
    }

    #[tokio::test]
    async fn test_run_collects_until_shutdown() {
        let server = server();
        let runtime = CollectionRuntime::new(
            agent_config(vec![line_input("line_a"), line_input("line_b")]),
            MockTransportFactory::new(server.clone()),
        );
        let shutdown = runtime.shutdown_handle();
        let acc: SharedAccumulator<MemoryAccumulator> = Arc::new(Mutex::new(MemoryAccumulator::new()));

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.initiate_shutdown();
        });

        let summaries = tokio::time::timeout(Duration::from_secs(5), runtime.run(acc.clone()))
            .await
            .expect("runtime should stop")
            .unwrap();

        assert_eq!(summaries.len(), 2);
        for summary in &summaries {
            assert!(summary.stats.cycles >= 2, "{:?}", summary);
            assert_eq!(summary.stats.failed_cycles, 0);
        }

        let metrics = acc.lock().len();
        assert!(metrics >= 4);
        assert_eq!(server.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_run_keeps_polling_after_failures() {
        let server = server();
        server.set_read_failure(Some("server busy"));
        let runtime = CollectionRuntime::new(
            agent_config(vec![line_input("line_a")]),
            MockTransportFactory::new(server.clone()),
        );
        let shutdown = runtime.shutdown_handle();
        let acc: SharedAccumulator<MemoryAccumulator> = Arc::new(Mutex::new(MemoryAccumulator::new()));

        let trigger = shutdown.clone();
        let recovering = server.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            recovering.set_read_failure(None);
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.initiate_shutdown();
        });

        let summaries = tokio::time::timeout(Duration::from_secs(5), runtime.run(acc.clone()))
            .await
            .expect("runtime should stop")
            .unwrap();

        let stats = summaries[0].stats;
        assert!(stats.failed_cycles >= 1);
        assert!(stats.successful_cycles >= 1);
        assert!(!acc.lock().errors().is_empty());
        assert!(!acc.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_zero_interval() {
        let runtime = CollectionRuntime::new(agent_config(vec![line_input("line_a")]), MockTransportFactory::new(server()))
            .with_interval(Duration::ZERO);
        let acc: SharedAccumulator<MemoryAccumulator> = Arc::new(Mutex::new(MemoryAccumulator::new()));

        assert!(matches!(runtime.run(acc).await, Err(BinError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_shutdown_before_run_exits_promptly() {
        let runtime = CollectionRuntime::new(agent_config(vec![line_input("line_a")]), MockTransportFactory::new(server()));
        runtime.shutdown_handle().initiate_shutdown();
        let acc: SharedAccumulator<MemoryAccumulator> = Arc::new(Mutex::new(MemoryAccumulator::new()));

        let summaries = tokio::time::timeout(Duration::from_secs(1), runtime.run(acc.clone()))
            .await
            .expect("runtime should stop")
            .unwrap();

        assert_eq!(summaries[0].stats.cycles, 0);
        assert!(acc.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_mid_cycle_discards_the_cycle() {
        let server = server();
        server.set_read_delay(Duration::from_secs(2));
        let runtime = CollectionRuntime::new(
            agent_config(vec![line_input("line_a")]),
            MockTransportFactory::new(server.clone()),
        );
        let shutdown = runtime.shutdown_handle();
        let acc: SharedAccumulator<MemoryAccumulator> = Arc::new(Mutex::new(MemoryAccumulator::new()));

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.initiate_shutdown();
        });

        let started = std::time::Instant::now();
        let summaries = tokio::time::timeout(Duration::from_secs(1), runtime.run(acc.clone()))
            .await
            .expect("in-flight cycle should be abandoned")
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(summaries[0].stats.cycles, 1);
        assert_eq!(summaries[0].stats.successful_cycles, 0);
        assert!(acc.lock().is_empty());
        assert!(acc.lock().errors().is_empty());
        assert_eq!(server.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_slow_cycles_skip_ticks() {
        let server = server();
        server.set_read_delay(Duration::from_millis(110));
        let runtime = CollectionRuntime::new(
            agent_config(vec![line_input("line_a")]),
            MockTransportFactory::new(server.clone()),
        );
        assert_eq!(runtime.interval(), Duration::from_millis(20));
        let shutdown = runtime.shutdown_handle();
        let acc: SharedAccumulator<MemoryAccumulator> = Arc::new(Mutex::new(MemoryAccumulator::new()));

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.initiate_shutdown();
        });

        let summaries = tokio::time::timeout(Duration::from_secs(5), runtime.run(acc.clone()))
            .await
            .expect("runtime should stop")
            .unwrap();

        // 500ms of 110ms reads fits at most five cycles; queued ticks would add more.
        let stats = summaries[0].stats;
        assert!(stats.cycles >= 3, "{:?}", stats);
        assert!(stats.cycles <= 6, "{:?}", stats);
        assert_eq!(server.read_requests(), stats.successful_cycles);
        assert_eq!(acc.lock().len() as u64, stats.successful_cycles);
    }
}
