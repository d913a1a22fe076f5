// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Read executor.
//!
//! Reads every mapped node on an open [`Session`] and turns per-node
//! results into [`NodeValue`]s, index-aligned with the mappings.
//!
//! Two steps decide a node's value, and they are independent:
//!
//! 1. the [`StatusCodeGate`] accepts or rejects the status code;
//! 2. [`decode_value`] converts an accepted protocol value to a field value.
//!
//! Failing either step leaves the node absent for this cycle. Only a
//! failure of the request itself aborts the cycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use uapoll_core::FieldValue;

use crate::client::{OpcUaTransport, OpcUaValue, ReadResult, Session};
use crate::config::ReadClientWorkarounds;
use crate::error::{OpcUaError, OpcUaResult};
use crate::mapping::NodeMetricMapping;
use crate::status::{StatusCode, StatusCodeGate};
use crate::types::NodeId;

// =============================================================================
// NodeValue
// =============================================================================

/// Why a node has no value this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeReadIssue {
    /// The status code is neither good nor allowlisted.
    BadStatus(StatusCode),

    /// The status was accepted but the server sent no value.
    NoValue,

    /// The status was accepted but the value type has no field mapping.
    Undecodable {
        /// OPC UA type name of the value.
        type_name: String,
    },
}

impl fmt::Display for NodeReadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatus(status) => write!(f, "status {}", status),
            Self::NoValue => write!(f, "no value returned"),
            Self::Undecodable { type_name } => write!(f, "cannot decode {} value", type_name),
        }
    }
}

/// The outcome of reading one node in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeValue {
    /// Decoded value, absent on failure.
    pub value: Option<FieldValue>,

    /// Status code returned for the node.
    pub status: StatusCode,

    /// Reason for an absent value.
    pub issue: Option<NodeReadIssue>,

    /// Server timestamp, if returned.
    pub server_timestamp: Option<DateTime<Utc>>,

    /// Source timestamp, if returned.
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl NodeValue {
    /// Returns `true` if the node produced a value.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    fn absent(status: StatusCode, issue: NodeReadIssue, result: &ReadResult) -> Self {
        Self {
            value: None,
            status,
            issue: Some(issue),
            server_timestamp: result.server_timestamp,
            source_timestamp: result.source_timestamp,
        }
    }

    /// Applies the gate and decoding to one raw result.
    pub fn from_result(result: &ReadResult, gate: &StatusCodeGate) -> Self {
        let status = result.status_code;
        if !gate.accepts(status) {
            return Self::absent(status, NodeReadIssue::BadStatus(status), result);
        }

        let raw = match &result.value {
            Some(raw) => raw,
            None => return Self::absent(status, NodeReadIssue::NoValue, result),
        };

        match decode_value(raw) {
            Ok(value) => Self {
                value: Some(value),
                status,
                issue: None,
                server_timestamp: result.server_timestamp,
                source_timestamp: result.source_timestamp,
            },
            Err(issue) => Self::absent(status, issue, result),
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Converts a protocol value into a field value.
///
/// Scalars keep their width and signedness. GUIDs become hyphenated text,
/// byte strings base64 text, and date-times RFC 3339 UTC text. Arrays,
/// nulls and unmapped types are undecodable.
pub fn decode_value(value: &OpcUaValue) -> Result<FieldValue, NodeReadIssue> {
    let field = match value {
        OpcUaValue::Boolean(v) => FieldValue::Bool(*v),
        OpcUaValue::SByte(v) => FieldValue::Int8(*v),
        OpcUaValue::Byte(v) => FieldValue::UInt8(*v),
        OpcUaValue::Int16(v) => FieldValue::Int16(*v),
        OpcUaValue::UInt16(v) => FieldValue::UInt16(*v),
        OpcUaValue::Int32(v) => FieldValue::Int32(*v),
        OpcUaValue::UInt32(v) => FieldValue::UInt32(*v),
        OpcUaValue::Int64(v) => FieldValue::Int64(*v),
        OpcUaValue::UInt64(v) => FieldValue::UInt64(*v),
        OpcUaValue::Float(v) => FieldValue::Float32(*v),
        OpcUaValue::Double(v) => FieldValue::Float64(*v),
        OpcUaValue::String(v) => FieldValue::String(v.clone()),
        OpcUaValue::DateTime(v) => FieldValue::String(v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        OpcUaValue::Guid(v) => FieldValue::String(v.hyphenated().to_string()),
        OpcUaValue::ByteString(v) => FieldValue::String(BASE64.encode(v)),
        OpcUaValue::Array(_) | OpcUaValue::Null | OpcUaValue::Unsupported(_) => {
            return Err(NodeReadIssue::Undecodable {
                type_name: value.type_name().to_string(),
            })
        }
    };
    Ok(field)
}

// =============================================================================
// ReadStats
// =============================================================================

/// Counters for the read path.
#[derive(Debug, Default)]
pub struct ReadStats {
    cycles: AtomicU64,
    successful_cycles: AtomicU64,
    failed_cycles: AtomicU64,
    good_reads: AtomicU64,
    bad_reads: AtomicU64,
    reconnects: AtomicU64,
}

/// A point-in-time copy of [`ReadStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStatsSnapshot {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles whose request succeeded.
    pub successful_cycles: u64,
    /// Cycles aborted by a total failure.
    pub failed_cycles: u64,
    /// Node reads that produced a value.
    pub good_reads: u64,
    /// Node reads that produced no value.
    pub bad_reads: u64,
    /// Sessions opened after the first.
    pub reconnects: u64,
}

impl ReadStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self, values: &[NodeValue]) {
        let good = values.iter().filter(|v| v.is_present()).count() as u64;
        self.successful_cycles.fetch_add(1, Ordering::Relaxed);
        self.good_reads.fetch_add(good, Ordering::Relaxed);
        self.bad_reads
            .fetch_add(values.len() as u64 - good, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    pub fn snapshot(&self) -> ReadStatsSnapshot {
        ReadStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            successful_cycles: self.successful_cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            good_reads: self.good_reads.load(Ordering::Relaxed),
            bad_reads: self.bad_reads.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// ReadExecutor
// =============================================================================

/// Executes read cycles for one input.
#[derive(Debug)]
pub struct ReadExecutor {
    gate: StatusCodeGate,
    use_unregistered_reads: bool,
    /// Last reported issue per mapping index, for log rate limiting.
    failing: HashMap<usize, NodeReadIssue>,
}

impl ReadExecutor {
    /// Creates an executor.
    pub fn new(gate: StatusCodeGate, workarounds: ReadClientWorkarounds) -> Self {
        Self {
            gate,
            use_unregistered_reads: workarounds.use_unregistered_reads,
            failing: HashMap::new(),
        }
    }

    /// The status gate in use.
    pub fn gate(&self) -> &StatusCodeGate {
        &self.gate
    }

    /// Returns `true` when reading node by node.
    pub fn uses_unregistered_reads(&self) -> bool {
        self.use_unregistered_reads
    }

    /// Reads every mapped node.
    ///
    /// The result is index-aligned with `mappings`. An `Err` means the
    /// cycle failed as a whole and no values are returned.
    pub async fn read_all<T: OpcUaTransport>(
        &mut self,
        session: &mut Session<T>,
        mappings: &[NodeMetricMapping],
    ) -> OpcUaResult<Vec<NodeValue>> {
        if mappings.is_empty() {
            return Ok(Vec::new());
        }

        let results = if self.use_unregistered_reads {
            Self::read_unregistered(session, mappings).await?
        } else {
            Self::read_registered(session, mappings).await?
        };

        let values: Vec<NodeValue> = results
            .iter()
            .map(|result| NodeValue::from_result(result, &self.gate))
            .collect();

        for (index, (mapping, value)) in mappings.iter().zip(&values).enumerate() {
            self.track(index, mapping, value);
        }

        Ok(values)
    }

    async fn read_unregistered<T: OpcUaTransport>(
        session: &Session<T>,
        mappings: &[NodeMetricMapping],
    ) -> OpcUaResult<Vec<ReadResult>> {
        let mut results = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            results.push(session.read_one(&mapping.node_id).await?);
        }
        Ok(results)
    }

    async fn read_registered<T: OpcUaTransport>(
        session: &mut Session<T>,
        mappings: &[NodeMetricMapping],
    ) -> OpcUaResult<Vec<ReadResult>> {
        if session.registered_nodes().is_none() {
            let node_ids: Vec<NodeId> = mappings.iter().map(|m| m.node_id.clone()).collect();
            let handles = match session.register_nodes(&node_ids).await {
                Ok(handles) => {
                    debug!(count = handles.len(), "Registered nodes");
                    handles
                }
                Err(e) if registration_unsupported(&e) => {
                    warn!(error = %e, "Node registration failed, reading original node ids");
                    node_ids
                }
                Err(e) => return Err(e),
            };
            session.set_registered_nodes(handles);
        }

        let handles = session.registered_nodes().unwrap_or_default().to_vec();
        session.read(&handles).await
    }

    /// Records a node's outcome. Returns `true` when the transition was logged.
    fn track(&mut self, index: usize, mapping: &NodeMetricMapping, value: &NodeValue) -> bool {
        match &value.issue {
            None => {
                trace!(
                    node = %mapping.describe(),
                    server_timestamp = ?value.server_timestamp,
                    source_timestamp = ?value.source_timestamp,
                    "Node read"
                );
                if self.failing.remove(&index).is_some() {
                    info!(node = %mapping.describe(), "Node readable again");
                    return true;
                }
                false
            }
            Some(issue) => {
                if self.failing.get(&index) == Some(issue) {
                    return false;
                }
                info!(node = %mapping.describe(), issue = %issue, "Node unreadable");
                self.failing.insert(index, issue.clone());
                true
            }
        }
    }

    /// Number of nodes currently failing.
    pub fn failing_nodes(&self) -> usize {
        self.failing.len()
    }
}

/// A registration failure the server reported, as opposed to a lost session.
fn registration_unsupported(error: &OpcUaError) -> bool {
    matches!(error, OpcUaError::Read(_))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockServer, MockTransportFactory};
    use crate::client::{SessionManager, SessionSettings};
    use crate::config::ReadClientConfig;
    use crate::tags::TagSet;
    use chrono::TimeZone;

    fn mapping(field: &str, node_id: NodeId) -> NodeMetricMapping {
        NodeMetricMapping {
            node_id,
            metric_name: "m".into(),
            field_name: field.into(),
            tags: TagSet::new(),
        }
    }

    fn manager(server: &MockServer) -> SessionManager<MockTransportFactory> {
        SessionManager::new(
            MockTransportFactory::new(server.clone()),
            SessionSettings::from_config(&ReadClientConfig::new("opc.tcp://mock:4840")),
        )
    }

    #[test]
    fn test_decode_scalars_keep_type() {
        assert_eq!(decode_value(&OpcUaValue::Boolean(true)), Ok(FieldValue::Bool(true)));
        assert_eq!(decode_value(&OpcUaValue::SByte(-3)), Ok(FieldValue::Int8(-3)));
        assert_eq!(decode_value(&OpcUaValue::UInt16(9)), Ok(FieldValue::UInt16(9)));
        assert_eq!(decode_value(&OpcUaValue::UInt64(u64::MAX)), Ok(FieldValue::UInt64(u64::MAX)));
        assert_eq!(decode_value(&OpcUaValue::Float(1.5)), Ok(FieldValue::Float32(1.5)));
        assert_eq!(decode_value(&OpcUaValue::String("x".into())), Ok(FieldValue::String("x".into())));
    }

    #[test]
    fn test_decode_text_forms() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            decode_value(&OpcUaValue::DateTime(ts)),
            Ok(FieldValue::String("2024-03-01T12:30:00Z".into()))
        );

        let guid = uuid::Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            decode_value(&OpcUaValue::Guid(guid)),
            Ok(FieldValue::String("550e8400-e29b-41d4-a716-446655440000".into()))
        );
        assert_eq!(
            decode_value(&OpcUaValue::ByteString(b"Hello".to_vec())),
            Ok(FieldValue::String("SGVsbG8=".into()))
        );
    }

    #[test]
    fn test_decode_undecodable() {
        let err = decode_value(&OpcUaValue::Array(vec![OpcUaValue::Int32(1)])).unwrap_err();
        assert_eq!(err, NodeReadIssue::Undecodable { type_name: "Array".into() });
        assert!(decode_value(&OpcUaValue::Null).is_err());
        assert!(decode_value(&OpcUaValue::Unsupported("ExtensionObject".into())).is_err());
    }

    #[test]
    fn test_gate_then_decode() {
        let gate = StatusCodeGate::parse(&["0xC0"]).unwrap();
        let node = NodeId::numeric(1, 1);

        let good = NodeValue::from_result(&ReadResult::success(node.clone(), OpcUaValue::Int32(5)), &gate);
        assert_eq!(good.value, Some(FieldValue::Int32(5)));

        let allowed = ReadResult::success(node.clone(), OpcUaValue::Int32(6)).with_status(0xC0);
        assert_eq!(NodeValue::from_result(&allowed, &gate).value, Some(FieldValue::Int32(6)));

        let rejected = ReadResult::success(node.clone(), OpcUaValue::Int32(7)).with_status(0x8034_0000);
        let rejected = NodeValue::from_result(&rejected, &gate);
        assert!(!rejected.is_present());
        assert_eq!(rejected.issue, Some(NodeReadIssue::BadStatus(StatusCode(0x8034_0000))));

        let mismatch = NodeValue::from_result(&ReadResult::success(node.clone(), OpcUaValue::Null), &gate);
        assert!(matches!(mismatch.issue, Some(NodeReadIssue::Undecodable { .. })));

        let empty = ReadResult::failure(node, 0u32);
        assert_eq!(NodeValue::from_result(&empty, &gate).issue, Some(NodeReadIssue::NoValue));
    }

    #[tokio::test]
    async fn test_registered_read_is_one_batch() {
        let server = MockServer::new();
        server.set_value(NodeId::numeric(1, 1), OpcUaValue::Int32(1));
        server.set_value(NodeId::numeric(1, 2), OpcUaValue::Int32(2));
        server.set_status(NodeId::numeric(1, 3), 0x8034_0000u32);
        let mappings = vec![
            mapping("a", NodeId::numeric(1, 1)),
            mapping("b", NodeId::numeric(1, 2)),
            mapping("c", NodeId::numeric(1, 3)),
        ];

        let mut session = manager(&server).connect().await.unwrap();
        let mut executor = ReadExecutor::new(StatusCodeGate::default(), ReadClientWorkarounds::default());
        assert!(!executor.uses_unregistered_reads());

        let values = executor.read_all(&mut session, &mappings).await.unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].value, Some(FieldValue::Int32(1)));
        assert_eq!(values[1].value, Some(FieldValue::Int32(2)));
        assert!(!values[2].is_present());
        assert_eq!(executor.failing_nodes(), 1);

        executor.read_all(&mut session, &mappings).await.unwrap();
        assert_eq!(server.register_requests(), 1);
        assert_eq!(server.read_batch_sizes(), vec![3, 3]);
    }

    #[tokio::test]
    async fn test_unregistered_reads_one_request_per_node() {
        let server = MockServer::new();
        server.set_value(NodeId::numeric(1, 1), OpcUaValue::Int32(1));
        server.set_value(NodeId::numeric(1, 2), OpcUaValue::Int32(2));
        let mappings = vec![mapping("a", NodeId::numeric(1, 1)), mapping("b", NodeId::numeric(1, 2))];

        let mut session = manager(&server).connect().await.unwrap();
        let workarounds = ReadClientWorkarounds {
            use_unregistered_reads: true,
        };
        let mut executor = ReadExecutor::new(StatusCodeGate::default(), workarounds);
        assert!(executor.uses_unregistered_reads());

        let values = executor.read_all(&mut session, &mappings).await.unwrap();
        assert_eq!(values[1].value, Some(FieldValue::Int32(2)));
        assert_eq!(server.register_requests(), 0);
        assert_eq!(server.read_batch_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_registration_failure_falls_back() {
        let server = MockServer::new();
        server.set_reject_registration(true);
        server.set_value(NodeId::numeric(1, 1), OpcUaValue::Int32(1));

        let mut session = manager(&server).connect().await.unwrap();
        let mut executor = ReadExecutor::new(StatusCodeGate::default(), ReadClientWorkarounds::default());
        let values = executor
            .read_all(&mut session, &[mapping("a", NodeId::numeric(1, 1))])
            .await
            .unwrap();
        assert_eq!(values[0].value, Some(FieldValue::Int32(1)));
        assert_eq!(session.registered_nodes(), Some(&[NodeId::numeric(1, 1)][..]));
    }

    #[tokio::test]
    async fn test_total_failure_is_error() {
        let server = MockServer::new();
        server.set_value(NodeId::numeric(1, 1), OpcUaValue::Int32(1));
        let mut session = manager(&server).connect().await.unwrap();
        let mut executor = ReadExecutor::new(StatusCodeGate::default(), ReadClientWorkarounds::default());

        server.set_read_failure(Some("connection reset"));
        let err = executor
            .read_all(&mut session, &[mapping("a", NodeId::numeric(1, 1))])
            .await
            .unwrap_err();
        assert!(err.requires_reconnect());
    }

    #[test]
    fn test_node_issues_logged_on_change_only() {
        let gate = StatusCodeGate::default();
        let node = NodeId::numeric(1, 7);
        let m = mapping("a", node.clone());
        let mut executor = ReadExecutor::new(gate.clone(), ReadClientWorkarounds::default());
        let read = |status: u32| {
            if status == 0 {
                NodeValue::from_result(&ReadResult::success(node.clone(), OpcUaValue::Int32(1)), &gate)
            } else {
                NodeValue::from_result(&ReadResult::failure(node.clone(), status), &gate)
            }
        };

        assert!(!executor.track(0, &m, &read(0)));
        assert_eq!(executor.failing_nodes(), 0);

        assert!(executor.track(0, &m, &read(0x8034_0000)));
        assert!(!executor.track(0, &m, &read(0x8034_0000)));
        assert_eq!(
            executor.failing.get(&0),
            Some(&NodeReadIssue::BadStatus(StatusCode(0x8034_0000)))
        );

        assert!(executor.track(0, &m, &read(0x803E_0000)));
        assert_eq!(
            executor.failing.get(&0),
            Some(&NodeReadIssue::BadStatus(StatusCode(0x803E_0000)))
        );
        assert_eq!(executor.failing_nodes(), 1);

        assert!(executor.track(0, &m, &read(0)));
        assert!(!executor.track(0, &m, &read(0)));
        assert_eq!(executor.failing_nodes(), 0);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = ReadStats::new();
        stats.record_cycle();
        stats.record_cycle();
        stats.record_failure();
        let gate = StatusCodeGate::default();
        let node = NodeId::numeric(0, 1);
        stats.record_success(&[
            NodeValue::from_result(&ReadResult::success(node.clone(), OpcUaValue::Int32(1)), &gate),
            NodeValue::from_result(&ReadResult::failure(node, 0x8000_0000u32), &gate),
        ]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles, 2);
        assert_eq!(snapshot.successful_cycles, 1);
        assert_eq!(snapshot.failed_cycles, 1);
        assert_eq!(snapshot.good_reads, 1);
        assert_eq!(snapshot.bad_reads, 1);
    }
}
