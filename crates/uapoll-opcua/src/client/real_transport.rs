// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport backed by the `opcua` crate.
//!
//! The `opcua` 0.12 client API is synchronous, so every protocol call runs
//! on the blocking pool. The session handle is shared with those calls
//! through an `Arc`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use opcua::client::prelude::{
    AttributeService, Client, ClientBuilder, IdentityToken, Session as UaSession, ViewService,
};
use opcua::sync::RwLock as OpcUaRwLock;
use opcua::types::{
    AttributeId, DataValue, MessageSecurityMode, QualifiedName, ReadValueId, TimestampsToReturn, UAString,
    UserTokenType,
};

use crate::client::transport::{
    EndpointDescription, OpcUaTransport, OpcUaValue, ReadResult, TransportFactory, TransportSettings,
    TransportState, UserIdentity,
};
use crate::error::{AuthenticationError, ConnectionError, OpcUaError, OpcUaResult, ReadError};
use crate::types::{AuthMethod, NodeId, NodeIdentifier, SecurityMode, SecurityPolicy};

type SharedSession = Arc<OpcUaRwLock<UaSession>>;

// =============================================================================
// RealOpcUaTransport
// =============================================================================

/// OPC UA transport talking to a real server.
pub struct RealOpcUaTransport {
    settings: TransportSettings,
    state: Mutex<TransportState>,
    session: Mutex<Option<SharedSession>>,
    advertised: Vec<opcua::types::EndpointDescription>,
}

impl RealOpcUaTransport {
    /// Creates an unconnected transport.
    pub fn new(settings: TransportSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(TransportState::Disconnected),
            session: Mutex::new(None),
            advertised: Vec::new(),
        }
    }

    fn set_state(&self, state: TransportState) {
        *self.state.lock() = state;
    }

    fn current_session(&self) -> OpcUaResult<SharedSession> {
        self.session.lock().clone().ok_or_else(OpcUaError::not_connected)
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
        match &node_id.identifier {
            NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
            NodeIdentifier::String(v) => opcua::types::NodeId::new(node_id.namespace_index, v.clone()),
            NodeIdentifier::Guid(v) => opcua::types::NodeId::new(
                node_id.namespace_index,
                opcua::types::Guid::from_bytes(*v.as_bytes()),
            ),
            NodeIdentifier::Opaque(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, opcua::types::ByteString::from(v.as_slice()))
            }
        }
    }

    fn from_opcua_node_id(node_id: &opcua::types::NodeId) -> NodeId {
        let namespace_index = node_id.namespace;
        match &node_id.identifier {
            opcua::types::Identifier::Numeric(v) => NodeId::numeric(namespace_index, *v),
            opcua::types::Identifier::String(v) => NodeId::string(namespace_index, v.as_ref()),
            opcua::types::Identifier::Guid(v) => {
                NodeId::guid(namespace_index, uuid::Uuid::from_bytes(*v.as_bytes()))
            }
            opcua::types::Identifier::ByteString(v) => {
                NodeId::opaque(namespace_index, v.value.clone().unwrap_or_default())
            }
        }
    }

    fn from_opcua_datetime(value: &opcua::types::DateTime) -> DateTime<Utc> {
        value.as_chrono()
    }

    fn from_opcua_variant(variant: &opcua::types::Variant) -> OpcUaValue {
        use opcua::types::Variant;

        match variant {
            Variant::Empty => OpcUaValue::Null,
            Variant::Boolean(v) => OpcUaValue::Boolean(*v),
            Variant::SByte(v) => OpcUaValue::SByte(*v),
            Variant::Byte(v) => OpcUaValue::Byte(*v),
            Variant::Int16(v) => OpcUaValue::Int16(*v),
            Variant::UInt16(v) => OpcUaValue::UInt16(*v),
            Variant::Int32(v) => OpcUaValue::Int32(*v),
            Variant::UInt32(v) => OpcUaValue::UInt32(*v),
            Variant::Int64(v) => OpcUaValue::Int64(*v),
            Variant::UInt64(v) => OpcUaValue::UInt64(*v),
            Variant::Float(v) => OpcUaValue::Float(*v),
            Variant::Double(v) => OpcUaValue::Double(*v),
            Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
            Variant::DateTime(v) => OpcUaValue::DateTime(Self::from_opcua_datetime(v)),
            Variant::Guid(v) => OpcUaValue::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
            Variant::ByteString(v) => OpcUaValue::ByteString(v.value.clone().unwrap_or_default()),
            Variant::Array(arr) => {
                OpcUaValue::Array(arr.values.iter().map(Self::from_opcua_variant).collect())
            }
            other => OpcUaValue::Unsupported(format!("{:?}", other.type_id())),
        }
    }

    fn from_data_value(node_id: &NodeId, data_value: &DataValue) -> ReadResult {
        let status = data_value.status.map(|s| s.bits()).unwrap_or(0);
        let mut result = match &data_value.value {
            Some(variant) => ReadResult::success(node_id.clone(), Self::from_opcua_variant(variant)).with_status(status),
            None => ReadResult::failure(node_id.clone(), status),
        };
        result.server_timestamp = data_value.server_timestamp.as_ref().map(Self::from_opcua_datetime);
        result.source_timestamp = data_value.source_timestamp.as_ref().map(Self::from_opcua_datetime);
        result
    }

    fn policy_from_uri(uri: &str) -> Option<SecurityPolicy> {
        SecurityPolicy::from_uri(uri)
    }

    fn mode_from_opcua(mode: MessageSecurityMode) -> Option<SecurityMode> {
        match mode {
            MessageSecurityMode::None => Some(SecurityMode::None),
            MessageSecurityMode::Sign => Some(SecurityMode::Sign),
            MessageSecurityMode::SignAndEncrypt => Some(SecurityMode::SignAndEncrypt),
            _ => None,
        }
    }

    fn token_from_opcua(token: UserTokenType) -> Option<AuthMethod> {
        match token {
            UserTokenType::Anonymous => Some(AuthMethod::Anonymous),
            UserTokenType::UserName => Some(AuthMethod::UserName),
            UserTokenType::Certificate => Some(AuthMethod::Certificate),
            UserTokenType::IssuedToken => None,
        }
    }

    fn to_description(endpoint: &opcua::types::EndpointDescription) -> Option<EndpointDescription> {
        let policy = Self::policy_from_uri(endpoint.security_policy_uri.as_ref())?;
        let mode = Self::mode_from_opcua(endpoint.security_mode)?;
        let tokens = endpoint
            .user_identity_tokens
            .iter()
            .flatten()
            .filter_map(|token| Self::token_from_opcua(token.token_type));

        Some(
            EndpointDescription::new(endpoint.endpoint_url.as_ref(), policy, mode)
                .with_security_level(endpoint.security_level)
                .with_user_tokens(tokens),
        )
    }

    fn identity_token(identity: &UserIdentity) -> IdentityToken {
        match identity {
            UserIdentity::Anonymous => IdentityToken::Anonymous,
            UserIdentity::UserName { username, password } => {
                IdentityToken::UserName(username.clone(), password.clone())
            }
            UserIdentity::Certificate(cert) => {
                IdentityToken::X509(cert.certificate_path.clone(), cert.private_key_path.clone())
            }
        }
    }
}

/// Builds an `opcua` client from the transport settings.
fn build_client(settings: &TransportSettings) -> OpcUaResult<Client> {
    let mut builder = ClientBuilder::new()
        .application_name(settings.application_name.as_str())
        .application_uri(format!("urn:{}", settings.application_name))
        .product_uri(format!("urn:{}", settings.application_name))
        .session_retry_limit(0)
        .session_timeout(settings.session_timeout.as_millis().min(u32::MAX as u128) as u32)
        .trust_server_certs(true);

    builder = match &settings.client_certificate {
        Some(cert) => builder
            .certificate_path(cert.certificate_path.clone())
            .private_key_path(cert.private_key_path.clone()),
        None => builder.create_sample_keypair(true),
    };

    builder.client().ok_or_else(|| {
        OpcUaError::connection(ConnectionError::transport(format!(
            "cannot build client for '{}'",
            settings.endpoint
        )))
    })
}

/// Maps a failed session call to the error taxonomy.
fn map_service_error(status: opcua::types::StatusCode) -> OpcUaError {
    use opcua::types::StatusCode as Ua;

    if status == Ua::BadConnectionClosed
        || status == Ua::BadNotConnected
        || status == Ua::BadSessionIdInvalid
        || status == Ua::BadSessionClosed
        || status == Ua::BadSecureChannelClosed
    {
        OpcUaError::connection(ConnectionError::closed(format!("{}", status)))
    } else {
        OpcUaError::read(ReadError::service(status.bits()))
    }
}

fn join_error(e: tokio::task::JoinError) -> OpcUaError {
    OpcUaError::connection(ConnectionError::transport(format!("blocking task failed: {}", e)))
}

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    async fn get_endpoints(&mut self) -> OpcUaResult<Vec<EndpointDescription>> {
        let settings = self.settings.clone();
        debug!(endpoint = %settings.endpoint, "Requesting server endpoints");

        let advertised = tokio::task::spawn_blocking(move || {
            let client = build_client(&settings)?;
            client.get_server_endpoints_from_url(settings.endpoint.as_str()).map_err(|status| {
                OpcUaError::connection(ConnectionError::endpoint_discovery(&settings.endpoint, status.to_string()))
            })
        })
        .await
        .map_err(join_error)??;

        let endpoints = advertised.iter().filter_map(Self::to_description).collect();
        self.advertised = advertised;
        Ok(endpoints)
    }

    async fn connect(&mut self, endpoint: &EndpointDescription, identity: &UserIdentity) -> OpcUaResult<()> {
        let raw = self
            .advertised
            .iter()
            .find(|candidate| {
                candidate.endpoint_url.as_ref() == endpoint.url
                    && Self::policy_from_uri(candidate.security_policy_uri.as_ref()) == Some(endpoint.security_policy)
                    && Self::mode_from_opcua(candidate.security_mode) == Some(endpoint.security_mode)
            })
            .cloned()
            .ok_or_else(|| {
                OpcUaError::connection(ConnectionError::refused(&self.settings.endpoint, "endpoint was not advertised"))
            })?;

        self.set_state(TransportState::Connecting);
        let settings = self.settings.clone();
        let token = Self::identity_token(identity);

        let connected = tokio::task::spawn_blocking(move || {
            let mut client = build_client(&settings)?;
            client.connect_to_endpoint(raw, token).map_err(|status| {
                use opcua::types::StatusCode as Ua;
                if status == Ua::BadIdentityTokenRejected
                    || status == Ua::BadIdentityTokenInvalid
                    || status == Ua::BadUserAccessDenied
                {
                    OpcUaError::authentication(AuthenticationError::rejected(status.to_string()))
                } else {
                    OpcUaError::connection(ConnectionError::refused(&settings.endpoint, status.to_string()))
                }
            })
        })
        .await
        .map_err(join_error)
        .and_then(|result| result);

        match connected {
            Ok(session) => {
                *self.session.lock() = Some(session);
                self.set_state(TransportState::Connected);
                info!(endpoint = %endpoint, "Connected to OPC UA server");
                Ok(())
            }
            Err(e) => {
                self.set_state(TransportState::Failed);
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> OpcUaResult<()> {
        let session = self.session.lock().take();
        if let Some(session) = session {
            tokio::task::spawn_blocking(move || session.read().disconnect())
                .await
                .map_err(join_error)?;
            debug!(endpoint = %self.settings.endpoint, "Disconnected from OPC UA server");
        }
        self.set_state(TransportState::Disconnected);
        Ok(())
    }

    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    async fn register_nodes(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<NodeId>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.current_session()?;
        let request: Vec<opcua::types::NodeId> = node_ids.iter().map(Self::to_opcua_node_id).collect();
        trace!(count = request.len(), "Registering nodes");

        let registered = tokio::task::spawn_blocking(move || session.read().register_nodes(&request))
            .await
            .map_err(join_error)?
            .map_err(map_service_error)?;

        Ok(registered.iter().map(Self::from_opcua_node_id).collect())
    }

    async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<ReadResult>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.current_session()?;
        let request: Vec<ReadValueId> = node_ids
            .iter()
            .map(|node_id| ReadValueId {
                node_id: Self::to_opcua_node_id(node_id),
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            })
            .collect();
        trace!(count = request.len(), "Reading node values");

        let values = tokio::task::spawn_blocking(move || {
            session.read().read(&request, TimestampsToReturn::Both, 0.0)
        })
        .await
        .map_err(join_error)?
        .map_err(map_service_error)?;

        Ok(node_ids
            .iter()
            .zip(values.iter())
            .map(|(node_id, data_value)| Self::from_data_value(node_id, data_value))
            .collect())
    }

    fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }
}

// =============================================================================
// RealTransportFactory
// =============================================================================

/// Creates [`RealOpcUaTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTransportFactory;

impl TransportFactory for RealTransportFactory {
    type Transport = RealOpcUaTransport;

    fn create(&self, settings: &TransportSettings) -> OpcUaResult<Self::Transport> {
        Ok(RealOpcUaTransport::new(settings.clone()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        let ours = NodeId::string(2, "Line1.Speed");
        let theirs = RealOpcUaTransport::to_opcua_node_id(&ours);
        assert_eq!(theirs.namespace, 2);
        assert_eq!(RealOpcUaTransport::from_opcua_node_id(&theirs), ours);

        let numeric = NodeId::numeric(0, 2258);
        let back = RealOpcUaTransport::from_opcua_node_id(&RealOpcUaTransport::to_opcua_node_id(&numeric));
        assert_eq!(back, numeric);
    }

    #[test]
    fn test_variant_conversion() {
        use opcua::types::Variant;

        assert_eq!(RealOpcUaTransport::from_opcua_variant(&Variant::Int32(42)), OpcUaValue::Int32(42));
        assert_eq!(RealOpcUaTransport::from_opcua_variant(&Variant::Boolean(true)), OpcUaValue::Boolean(true));
        assert_eq!(RealOpcUaTransport::from_opcua_variant(&Variant::Empty), OpcUaValue::Null);
    }

    #[test]
    fn test_missing_status_means_good() {
        let node = NodeId::numeric(2, 1);
        let data_value = DataValue::new_now(opcua::types::Variant::Double(1.5));
        let result = RealOpcUaTransport::from_data_value(&node, &data_value);
        assert_eq!(result.value, Some(OpcUaValue::Double(1.5)));
        assert!(result.status_code.is_good());
    }

    #[test]
    fn test_transport_starts_disconnected() {
        let transport = RealTransportFactory
            .create(&TransportSettings::new("opc.tcp://localhost:4840"))
            .unwrap();
        assert_eq!(transport.state(), TransportState::Disconnected);
        assert_eq!(transport.endpoint(), "opc.tcp://localhost:4840");
    }
}
