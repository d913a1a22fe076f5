// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA server for tests and dry runs.
//!
//! [`MockServer`] is a cloneable handle to shared state: advertised
//! endpoints, node values and status codes, injected failures and delays,
//! and counters of what clients did. [`MockTransportFactory`] creates
//! [`MockTransport`]s talking to it.
//!
//! ```
//! use uapoll_opcua::client::mock::MockServer;
//! use uapoll_opcua::client::OpcUaValue;
//! use uapoll_opcua::types::NodeId;
//!
//! let server = MockServer::new();
//! server.set_value(NodeId::numeric(2, 1001), OpcUaValue::Double(21.5));
//! server.set_status(NodeId::numeric(2, 1002), 0x8034_0000);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{AuthenticationError, ConnectionError, OpcUaError, OpcUaResult, ReadError};
use crate::status::StatusCode;
use crate::types::{AuthMethod, NodeId, SecurityMode, SecurityPolicy};

use super::transport::{
    EndpointDescription, OpcUaTransport, OpcUaValue, ReadResult, TransportFactory, TransportSettings,
    TransportState, UserIdentity,
};

const BAD_NODE_ID_UNKNOWN: u32 = 0x8034_0000;
const BAD_SERVICE_UNSUPPORTED: u32 = 0x800B_0000;
const ALIAS_NAMESPACE: u16 = 0xFFFF;

// =============================================================================
// MockServer
// =============================================================================

#[derive(Debug, Clone)]
struct MockNode {
    value: Option<OpcUaValue>,
    status: StatusCode,
}

#[derive(Debug, Default)]
struct MockState {
    endpoints: Vec<EndpointDescription>,
    nodes: HashMap<NodeId, MockNode>,
    aliases: HashMap<NodeId, NodeId>,

    connect_delay: Duration,
    read_delay: Duration,
    connect_failure: Option<String>,
    read_failure: Option<String>,
    reject_identity: Option<String>,
    reject_registration: bool,
    generation: u64,

    transports_created: u64,
    endpoint_requests: u64,
    connect_count: u64,
    disconnect_count: u64,
    open_sessions: u64,
    register_requests: u64,
    read_requests: u64,
    read_batch_sizes: Vec<usize>,
    last_identity: Option<AuthMethod>,
    last_endpoint: Option<EndpointDescription>,
    last_settings_had_certificate: bool,
}

/// Shared handle to an in-memory server.
#[derive(Debug, Clone)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// Creates a server advertising one unsecured endpoint.
    pub fn new() -> Self {
        let state = MockState {
            endpoints: vec![EndpointDescription::new(
                "opc.tcp://mock:4840",
                SecurityPolicy::None,
                SecurityMode::None,
            )],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    /// Replaces the advertised endpoints.
    pub fn set_endpoints(&self, endpoints: Vec<EndpointDescription>) {
        self.state.lock().endpoints = endpoints;
    }

    /// Sets a node to a good value.
    pub fn set_value(&self, node_id: NodeId, value: OpcUaValue) {
        self.state.lock().nodes.insert(
            node_id,
            MockNode {
                value: Some(value),
                status: StatusCode::GOOD,
            },
        );
    }

    /// Sets a node to a value with an explicit status.
    pub fn set_value_with_status(&self, node_id: NodeId, value: OpcUaValue, status: impl Into<StatusCode>) {
        self.state.lock().nodes.insert(
            node_id,
            MockNode {
                value: Some(value),
                status: status.into(),
            },
        );
    }

    /// Sets a node to a status with no value.
    pub fn set_status(&self, node_id: NodeId, status: impl Into<StatusCode>) {
        self.state.lock().nodes.insert(
            node_id,
            MockNode {
                value: None,
                status: status.into(),
            },
        );
    }

    /// Removes a node; reads return `BadNodeIdUnknown`.
    pub fn remove_node(&self, node_id: &NodeId) {
        self.state.lock().nodes.remove(node_id);
    }

    /// Delays every connect by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    /// Delays every read request by `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    /// Makes endpoint discovery and connect fail until cleared.
    pub fn set_connect_failure(&self, reason: Option<&str>) {
        self.state.lock().connect_failure = reason.map(str::to_string);
    }

    /// Makes read requests fail as a whole until cleared.
    pub fn set_read_failure(&self, reason: Option<&str>) {
        self.state.lock().read_failure = reason.map(str::to_string);
    }

    /// Makes session activation reject the user identity until cleared.
    pub fn set_reject_identity(&self, reason: Option<&str>) {
        self.state.lock().reject_identity = reason.map(str::to_string);
    }

    /// Makes RegisterNodes fail with `BadServiceUnsupported`.
    pub fn set_reject_registration(&self, reject: bool) {
        self.state.lock().reject_registration = reject;
    }

    /// Drops every open session, as a server restart would.
    pub fn drop_sessions(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.open_sessions = 0;
        state.aliases.clear();
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Transports created by factories.
    pub fn transports_created(&self) -> u64 {
        self.state.lock().transports_created
    }

    /// GetEndpoints requests received.
    pub fn endpoint_requests(&self) -> u64 {
        self.state.lock().endpoint_requests
    }

    /// Successful session activations.
    pub fn connect_count(&self) -> u64 {
        self.state.lock().connect_count
    }

    /// Client-initiated disconnects.
    pub fn disconnect_count(&self) -> u64 {
        self.state.lock().disconnect_count
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> u64 {
        self.state.lock().open_sessions
    }

    /// RegisterNodes requests received.
    pub fn register_requests(&self) -> u64 {
        self.state.lock().register_requests
    }

    /// Read requests received.
    pub fn read_requests(&self) -> u64 {
        self.state.lock().read_requests
    }

    /// Node count of every read request, in arrival order.
    pub fn read_batch_sizes(&self) -> Vec<usize> {
        self.state.lock().read_batch_sizes.clone()
    }

    /// Identity kind of the latest activation.
    pub fn last_identity(&self) -> Option<AuthMethod> {
        self.state.lock().last_identity
    }

    /// Endpoint of the latest activation.
    pub fn last_endpoint(&self) -> Option<EndpointDescription> {
        self.state.lock().last_endpoint.clone()
    }

    /// Whether the latest transport was given a client certificate.
    pub fn last_settings_had_certificate(&self) -> bool {
        self.state.lock().last_settings_had_certificate
    }

    fn resolve(&self, node_id: &NodeId) -> ReadResult {
        let state = self.state.lock();
        let target = state.aliases.get(node_id).unwrap_or(node_id);
        match state.nodes.get(target) {
            Some(node) => ReadResult {
                node_id: node_id.clone(),
                value: node.value.clone(),
                status_code: node.status,
                server_timestamp: Some(chrono::Utc::now()),
                source_timestamp: None,
            },
            None => ReadResult::failure(node_id.clone(), BAD_NODE_ID_UNKNOWN),
        }
    }
}

// =============================================================================
// MockTransport
// =============================================================================

/// Transport bound to a [`MockServer`].
#[derive(Debug)]
pub struct MockTransport {
    server: MockServer,
    endpoint: String,
    state: TransportState,
    generation: u64,
}

impl MockTransport {
    /// Creates a disconnected transport.
    pub fn new(server: MockServer, endpoint: impl Into<String>) -> Self {
        Self {
            server,
            endpoint: endpoint.into(),
            state: TransportState::Disconnected,
            generation: 0,
        }
    }

    fn ensure_connected(&self) -> OpcUaResult<()> {
        match self.state() {
            TransportState::Connected => Ok(()),
            TransportState::Failed => Err(ConnectionError::closed("session dropped by server").into()),
            _ => Err(OpcUaError::not_connected()),
        }
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    async fn get_endpoints(&mut self) -> OpcUaResult<Vec<EndpointDescription>> {
        let mut state = self.server.state.lock();
        state.endpoint_requests += 1;
        if let Some(reason) = &state.connect_failure {
            return Err(ConnectionError::endpoint_discovery(&self.endpoint, reason.clone()).into());
        }
        Ok(state.endpoints.clone())
    }

    async fn connect(&mut self, endpoint: &EndpointDescription, identity: &UserIdentity) -> OpcUaResult<()> {
        self.state = TransportState::Connecting;
        let delay = self.server.state.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.server.state.lock();
        if let Some(reason) = &state.connect_failure {
            self.state = TransportState::Failed;
            return Err(ConnectionError::refused(&self.endpoint, reason.clone()).into());
        }
        if let Some(reason) = &state.reject_identity {
            self.state = TransportState::Failed;
            return Err(AuthenticationError::rejected(reason.clone()).into());
        }

        state.connect_count += 1;
        state.open_sessions += 1;
        state.last_identity = Some(identity.method());
        state.last_endpoint = Some(endpoint.clone());
        self.generation = state.generation;
        self.state = TransportState::Connected;
        trace!(endpoint = %endpoint, "Mock session activated");
        Ok(())
    }

    async fn disconnect(&mut self) -> OpcUaResult<()> {
        if self.state.is_connected() {
            let mut state = self.server.state.lock();
            state.disconnect_count += 1;
            if self.generation == state.generation {
                state.open_sessions = state.open_sessions.saturating_sub(1);
            }
        }
        self.state = TransportState::Disconnected;
        Ok(())
    }

    fn state(&self) -> TransportState {
        if self.state.is_connected() && self.generation != self.server.state.lock().generation {
            return TransportState::Failed;
        }
        self.state
    }

    async fn register_nodes(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<NodeId>> {
        self.ensure_connected()?;
        let mut state = self.server.state.lock();
        state.register_requests += 1;
        if state.reject_registration {
            return Err(ReadError::service(BAD_SERVICE_UNSUPPORTED).into());
        }

        let mut handles = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let alias = NodeId::numeric(ALIAS_NAMESPACE, state.aliases.len() as u32 + 1);
            state.aliases.insert(alias.clone(), node_id.clone());
            handles.push(alias);
        }
        Ok(handles)
    }

    async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<ReadResult>> {
        self.ensure_connected()?;
        let delay = self.server.state.lock().read_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.server.state.lock();
            state.read_requests += 1;
            state.read_batch_sizes.push(node_ids.len());
            if let Some(reason) = &state.read_failure {
                return Err(ConnectionError::closed(reason.clone()).into());
            }
        }
        self.ensure_connected()?;

        Ok(node_ids.iter().map(|id| self.server.resolve(id)).collect())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// =============================================================================
// MockTransportFactory
// =============================================================================

/// Creates [`MockTransport`]s for one [`MockServer`].
#[derive(Debug, Clone)]
pub struct MockTransportFactory {
    server: MockServer,
}

impl MockTransportFactory {
    /// Creates a factory.
    pub fn new(server: MockServer) -> Self {
        Self { server }
    }

    /// The server behind this factory.
    pub fn server(&self) -> &MockServer {
        &self.server
    }
}

impl TransportFactory for MockTransportFactory {
    type Transport = MockTransport;

    fn create(&self, settings: &TransportSettings) -> OpcUaResult<Self::Transport> {
        {
            let mut state = self.server.state.lock();
            state.transports_created += 1;
            state.last_settings_had_certificate = settings.client_certificate.is_some();
        }
        Ok(MockTransport::new(self.server.clone(), &settings.endpoint))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected(server: &MockServer) -> MockTransport {
        let mut transport = MockTransport::new(server.clone(), "opc.tcp://mock:4840");
        let endpoints = transport.get_endpoints().await.unwrap();
        transport.connect(&endpoints[0], &UserIdentity::Anonymous).await.unwrap();
        transport
    }

    #[tokio::test]
    async fn test_read_known_and_unknown() {
        let server = MockServer::new();
        server.set_value(NodeId::numeric(1, 1), OpcUaValue::Int32(7));
        let transport = connected(&server).await;

        let results = transport
            .read_values(&[NodeId::numeric(1, 1), NodeId::numeric(1, 2)])
            .await
            .unwrap();
        assert_eq!(results[0].value, Some(OpcUaValue::Int32(7)));
        assert_eq!(results[1].status_code, StatusCode(BAD_NODE_ID_UNKNOWN));
        assert_eq!(server.read_batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn test_registered_aliases_resolve() {
        let server = MockServer::new();
        server.set_value(NodeId::string(2, "a"), OpcUaValue::Boolean(true));
        let transport = connected(&server).await;

        let handles = transport.register_nodes(&[NodeId::string(2, "a")]).await.unwrap();
        assert_ne!(handles[0], NodeId::string(2, "a"));
        let result = transport.read_value(&handles[0]).await.unwrap();
        assert_eq!(result.value, Some(OpcUaValue::Boolean(true)));
    }

    #[tokio::test]
    async fn test_dropped_session_fails_reads() {
        let server = MockServer::new();
        let transport = connected(&server).await;
        server.drop_sessions();

        assert_eq!(transport.state(), TransportState::Failed);
        let err = transport.read_values(&[NodeId::numeric(0, 1)]).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Connection(ConnectionError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_counts_once() {
        let server = MockServer::new();
        let mut transport = connected(&server).await;
        assert_eq!(server.open_sessions(), 1);
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert_eq!(server.disconnect_count(), 1);
        assert_eq!(server.open_sessions(), 0);
    }
}
