// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session management.
//!
//! [`SessionManager`] performs the full handshake (credentials, endpoint
//! discovery, security negotiation, session activation) under the connect
//! deadline and hands back an owned [`Session`]. Every request on a
//! session runs under the request deadline. A session is never repaired in
//! place: callers close it and ask the manager for a new one.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ReadClientConfig;
use crate::error::{
    AuthenticationError, NegotiationError, OpcUaError, OpcUaResult, ReadError, TimeoutError,
};
use crate::types::{AuthMethod, NodeId, SecurityModeSetting, SecurityPolicySetting};

use super::credentials::ClientCertificate;
use super::transport::{
    EndpointDescription, OpcUaTransport, ReadResult, TransportFactory, TransportSettings, UserIdentity,
};

// =============================================================================
// SessionSettings
// =============================================================================

/// Connection parameters taken from [`ReadClientConfig`].
#[derive(Clone)]
pub struct SessionSettings {
    /// Server endpoint URL.
    pub endpoint: String,
    /// Requested policy.
    pub security_policy: SecurityPolicySetting,
    /// Requested mode.
    pub security_mode: SecurityModeSetting,
    /// User identity kind.
    pub auth_method: AuthMethod,
    /// Username for `UserName`.
    pub username: String,
    /// Password for `UserName`.
    pub password: String,
    /// Certificate path.
    pub certificate: Option<PathBuf>,
    /// Private key path.
    pub private_key: Option<PathBuf>,
    /// Handshake deadline.
    pub connect_timeout: Duration,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Requested session lifetime.
    pub session_timeout: Duration,
}

impl SessionSettings {
    /// Extracts connection parameters from a plugin configuration.
    pub fn from_config(config: &ReadClientConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            security_policy: config.security_policy,
            security_mode: config.security_mode,
            auth_method: config.auth_method,
            username: config.username.clone(),
            password: config.password.clone(),
            certificate: config.certificate.clone(),
            private_key: config.private_key.clone(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            session_timeout: config.session_timeout,
        }
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("endpoint", &self.endpoint)
            .field("security_policy", &self.security_policy)
            .field("security_mode", &self.security_mode)
            .field("auth_method", &self.auth_method)
            .field("username", &self.username)
            .field("certificate", &self.certificate)
            .field("private_key", &self.private_key)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Endpoint selection
// =============================================================================

/// Picks the endpoint to connect to.
///
/// Candidates must satisfy the configured policy and mode and accept the
/// configured user token kind. Among them the strongest wins, ranked by
/// policy strength, then mode strength, then the server's security level;
/// ties keep the server's order.
pub fn select_endpoint(
    endpoints: &[EndpointDescription],
    server_url: &str,
    policy: SecurityPolicySetting,
    mode: SecurityModeSetting,
    auth_method: AuthMethod,
) -> OpcUaResult<EndpointDescription> {
    if endpoints.is_empty() {
        return Err(NegotiationError::no_endpoints(server_url).into());
    }

    if let SecurityPolicySetting::Explicit(wanted) = policy {
        if !endpoints.iter().any(|e| e.security_policy == wanted) {
            let mut advertised: Vec<&str> = endpoints.iter().map(|e| e.security_policy.name()).collect();
            advertised.sort_unstable();
            advertised.dedup();
            return Err(NegotiationError::policy_not_advertised(wanted.name(), advertised.join(", ")).into());
        }
    }

    let secure: Vec<&EndpointDescription> = endpoints
        .iter()
        .filter(|e| policy.matches(e.security_policy) && mode.matches(e.security_mode))
        .collect();
    if secure.is_empty() {
        return Err(NegotiationError::no_suitable_endpoint(policy.to_string(), mode.to_string()).into());
    }

    let rank = |e: &EndpointDescription| {
        (
            e.security_policy.strength(),
            e.security_mode.strength(),
            e.security_level,
        )
    };

    secure
        .into_iter()
        .filter(|e| e.accepts_token(auth_method))
        .fold(None::<&EndpointDescription>, |best, candidate| match best {
            Some(current) if rank(current) >= rank(candidate) => Some(current),
            _ => Some(candidate),
        })
        .cloned()
        .ok_or_else(|| AuthenticationError::token_not_accepted(auth_method.name()).into())
}

// =============================================================================
// SessionManager
// =============================================================================

/// Opens sessions against one server.
pub struct SessionManager<F: TransportFactory> {
    factory: F,
    settings: SessionSettings,
    handshakes: AtomicU64,
}

impl<F: TransportFactory> SessionManager<F> {
    /// Creates a manager.
    pub fn new(factory: F, settings: SessionSettings) -> Self {
        Self {
            factory,
            settings,
            handshakes: AtomicU64::new(0),
        }
    }

    /// Returns the settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Number of handshakes attempted so far.
    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }

    /// Runs a full handshake and returns an open session.
    ///
    /// The whole handshake is bounded by the connect timeout. On any error
    /// nothing stays open.
    pub async fn connect(&self) -> OpcUaResult<Session<F::Transport>> {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        let deadline = self.settings.connect_timeout;

        match tokio::time::timeout(deadline, self.handshake()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(endpoint = %self.settings.endpoint, timeout = ?deadline, "Connect timed out");
                Err(TimeoutError::connect(&self.settings.endpoint, deadline).into())
            }
        }
    }

    async fn handshake(&self) -> OpcUaResult<Session<F::Transport>> {
        let identity = self.build_identity().await?;
        let client_certificate = self.client_certificate(&identity).await?;

        let transport_settings = TransportSettings {
            endpoint: self.settings.endpoint.clone(),
            application_name: "uapoll".to_string(),
            session_timeout: self.settings.session_timeout,
            request_timeout: self.settings.request_timeout,
            client_certificate,
        };
        let mut transport = self.factory.create(&transport_settings)?;

        debug!(endpoint = %self.settings.endpoint, "Requesting server endpoints");
        let endpoints = transport.get_endpoints().await?;
        let endpoint = select_endpoint(
            &endpoints,
            &self.settings.endpoint,
            self.settings.security_policy,
            self.settings.security_mode,
            identity.method(),
        )?;

        if endpoint.security_policy.is_deprecated() {
            warn!(policy = %endpoint.security_policy, "Selected security policy is deprecated");
        }

        if let Err(e) = transport.connect(&endpoint, &identity).await {
            transport.disconnect().await.ok();
            return Err(e);
        }

        info!(
            endpoint = %endpoint.url,
            policy = %endpoint.security_policy,
            mode = %endpoint.security_mode,
            auth = %identity.method(),
            "Session opened"
        );

        Ok(Session::new(transport, endpoint, self.settings.request_timeout))
    }

    async fn build_identity(&self) -> Result<UserIdentity, AuthenticationError> {
        match self.settings.auth_method {
            AuthMethod::Anonymous => Ok(UserIdentity::Anonymous),
            AuthMethod::UserName => {
                if self.settings.username.is_empty() {
                    return Err(AuthenticationError::MissingUsername);
                }
                Ok(UserIdentity::UserName {
                    username: self.settings.username.clone(),
                    password: self.settings.password.clone(),
                })
            }
            AuthMethod::Certificate => {
                let certificate = self
                    .settings
                    .certificate
                    .as_ref()
                    .ok_or(AuthenticationError::MissingCertificate)?;
                let private_key = self
                    .settings
                    .private_key
                    .as_ref()
                    .ok_or(AuthenticationError::MissingPrivateKey)?;
                Ok(UserIdentity::Certificate(
                    ClientCertificate::load(certificate, private_key).await?,
                ))
            }
        }
    }

    /// The application certificate for the secure channel.
    async fn client_certificate(&self, identity: &UserIdentity) -> Result<Option<ClientCertificate>, AuthenticationError> {
        if let UserIdentity::Certificate(certificate) = identity {
            return Ok(Some(certificate.clone()));
        }
        match (&self.settings.certificate, &self.settings.private_key) {
            (Some(certificate), Some(private_key)) => {
                ClientCertificate::load(certificate, private_key).await.map(Some)
            }
            (None, None) => Ok(None),
            (Some(_), None) => Err(AuthenticationError::MissingPrivateKey),
            (None, Some(_)) => Err(AuthenticationError::MissingCertificate),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// An open session, exclusively owned by its collection loop.
pub struct Session<T: OpcUaTransport> {
    transport: T,
    endpoint: EndpointDescription,
    request_timeout: Duration,
    registered: Option<Vec<NodeId>>,
    closed: bool,
}

impl<T: OpcUaTransport> Session<T> {
    fn new(transport: T, endpoint: EndpointDescription, request_timeout: Duration) -> Self {
        Self {
            transport,
            endpoint,
            request_timeout,
            registered: None,
            closed: false,
        }
    }

    /// The negotiated endpoint.
    pub fn endpoint(&self) -> &EndpointDescription {
        &self.endpoint
    }

    /// Returns `true` until closed or dropped by the server.
    pub fn is_open(&self) -> bool {
        !self.closed && self.transport.is_connected()
    }

    /// Registered aliases for this session, if registration ran.
    pub fn registered_nodes(&self) -> Option<&[NodeId]> {
        self.registered.as_deref()
    }

    pub(crate) fn set_registered_nodes(&mut self, nodes: Vec<NodeId>) {
        self.registered = Some(nodes);
    }

    /// Registers nodes for repeated reads.
    pub async fn register_nodes(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<NodeId>> {
        let handles = self
            .request("register nodes", self.transport.register_nodes(node_ids))
            .await?;
        if handles.len() != node_ids.len() {
            return Err(ReadError::result_count_mismatch(node_ids.len(), handles.len()).into());
        }
        Ok(handles)
    }

    /// Reads many nodes in one request; results are in request order.
    pub async fn read(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<ReadResult>> {
        let results = self.request("read", self.transport.read_values(node_ids)).await?;
        if results.len() != node_ids.len() {
            return Err(ReadError::result_count_mismatch(node_ids.len(), results.len()).into());
        }
        Ok(results)
    }

    /// Reads one node in its own request.
    pub async fn read_one(&self, node_id: &NodeId) -> OpcUaResult<ReadResult> {
        self.request("read", self.transport.read_value(node_id)).await
    }

    /// Closes the session. Further calls are no-ops.
    pub async fn close(&mut self) -> OpcUaResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.registered = None;

        let result = match tokio::time::timeout(self.request_timeout, self.transport.disconnect()).await {
            Ok(result) => result,
            Err(_) => Err(TimeoutError::request("close session", self.request_timeout).into()),
        };
        info!(endpoint = %self.endpoint.url, "Session closed");
        result
    }

    async fn request<R>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = OpcUaResult<R>>,
    ) -> OpcUaResult<R> {
        if self.closed {
            return Err(OpcUaError::not_connected());
        }
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TimeoutError::request(operation, self.request_timeout).into()),
        }
    }
}

impl<T: OpcUaTransport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .field("registered", &self.registered.as_ref().map(Vec::len))
            .field("closed", &self.closed)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockServer, MockTransportFactory};
    use crate::error::OpcUaError;
    use crate::types::{SecurityMode, SecurityPolicy};

    const URL: &str = "opc.tcp://localhost:4840";

    fn endpoint(policy: SecurityPolicy, mode: SecurityMode) -> EndpointDescription {
        EndpointDescription::new(URL, policy, mode)
    }

    fn typical_endpoints() -> Vec<EndpointDescription> {
        vec![
            endpoint(SecurityPolicy::None, SecurityMode::None),
            endpoint(SecurityPolicy::Basic256Sha256, SecurityMode::Sign),
            endpoint(SecurityPolicy::Basic256Sha256, SecurityMode::SignAndEncrypt),
            endpoint(SecurityPolicy::Basic128Rsa15, SecurityMode::SignAndEncrypt),
        ]
    }

    fn settings() -> SessionSettings {
        SessionSettings::from_config(&ReadClientConfig::new(URL))
    }

    #[test]
    fn test_auto_picks_strongest() {
        let selected = select_endpoint(
            &typical_endpoints(),
            URL,
            SecurityPolicySetting::Auto,
            SecurityModeSetting::Auto,
            AuthMethod::Anonymous,
        )
        .unwrap();
        assert_eq!(selected.security_policy, SecurityPolicy::Basic256Sha256);
        assert_eq!(selected.security_mode, SecurityMode::SignAndEncrypt);
    }

    #[test]
    fn test_security_level_breaks_ties() {
        let endpoints = vec![
            endpoint(SecurityPolicy::Basic256Sha256, SecurityMode::Sign).with_security_level(1),
            endpoint(SecurityPolicy::Basic256Sha256, SecurityMode::Sign).with_security_level(9),
        ];
        let selected = select_endpoint(
            &endpoints,
            URL,
            SecurityPolicySetting::Auto,
            SecurityModeSetting::Auto,
            AuthMethod::Anonymous,
        )
        .unwrap();
        assert_eq!(selected.security_level, 9);
    }

    #[test]
    fn test_none_policy_selects_plain_endpoint() {
        let selected = select_endpoint(
            &typical_endpoints(),
            URL,
            SecurityPolicySetting::Explicit(SecurityPolicy::None),
            SecurityModeSetting::Auto,
            AuthMethod::Anonymous,
        )
        .unwrap();
        assert_eq!(selected.security_mode, SecurityMode::None);
    }

    #[test]
    fn test_explicit_policy_must_be_advertised() {
        let err = select_endpoint(
            &typical_endpoints(),
            URL,
            SecurityPolicySetting::Explicit(SecurityPolicy::Aes256Sha256RsaPss),
            SecurityModeSetting::Auto,
            AuthMethod::Anonymous,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::SecurityNegotiation(NegotiationError::PolicyNotAdvertised { .. })
        ));
        assert!(err.to_string().contains("Basic256Sha256"));
    }

    #[test]
    fn test_explicit_mode_without_match() {
        let err = select_endpoint(
            &[endpoint(SecurityPolicy::Basic256Sha256, SecurityMode::Sign)],
            URL,
            SecurityPolicySetting::Auto,
            SecurityModeSetting::Explicit(SecurityMode::SignAndEncrypt),
            AuthMethod::Anonymous,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::SecurityNegotiation(NegotiationError::NoSuitableEndpoint { .. })
        ));
    }

    #[test]
    fn test_no_endpoints() {
        let err = select_endpoint(
            &[],
            URL,
            SecurityPolicySetting::Auto,
            SecurityModeSetting::Auto,
            AuthMethod::Anonymous,
        )
        .unwrap_err();
        assert!(matches!(err, OpcUaError::SecurityNegotiation(NegotiationError::NoEndpoints { .. })));
    }

    #[test]
    fn test_token_type_filters_candidates() {
        let endpoints = vec![
            endpoint(SecurityPolicy::Basic256Sha256, SecurityMode::SignAndEncrypt)
                .with_user_tokens([AuthMethod::Certificate]),
            endpoint(SecurityPolicy::None, SecurityMode::None).with_user_tokens([AuthMethod::Anonymous]),
        ];
        let selected = select_endpoint(
            &endpoints,
            URL,
            SecurityPolicySetting::Auto,
            SecurityModeSetting::Auto,
            AuthMethod::Anonymous,
        )
        .unwrap();
        assert_eq!(selected.security_policy, SecurityPolicy::None);

        let err = select_endpoint(
            &endpoints,
            URL,
            SecurityPolicySetting::Auto,
            SecurityModeSetting::Auto,
            AuthMethod::UserName,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Authentication(AuthenticationError::TokenNotAccepted { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_and_close_idempotent() {
        let server = MockServer::new();
        let manager = SessionManager::new(MockTransportFactory::new(server.clone()), settings());

        let mut session = manager.connect().await.unwrap();
        assert!(session.is_open());
        assert_eq!(server.connect_count(), 1);
        assert_eq!(manager.handshakes(), 1);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_open());
        assert_eq!(server.disconnect_count(), 1);
        assert!(session.read(&[NodeId::numeric(1, 1)]).await.is_err());
    }

    #[tokio::test]
    async fn test_username_without_name_fails_before_io() {
        let server = MockServer::new();
        let mut settings = settings();
        settings.auth_method = AuthMethod::UserName;
        let manager = SessionManager::new(MockTransportFactory::new(server.clone()), settings);

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, OpcUaError::Authentication(AuthenticationError::MissingUsername)));
        assert_eq!(server.endpoint_requests(), 0);
    }

    #[tokio::test]
    async fn test_username_with_empty_password_allowed() {
        let server = MockServer::new();
        let mut settings = settings();
        settings.auth_method = AuthMethod::UserName;
        settings.username = "operator".into();
        let manager = SessionManager::new(MockTransportFactory::new(server.clone()), settings);

        manager.connect().await.unwrap();
        assert_eq!(server.last_identity(), Some(AuthMethod::UserName));
    }

    #[tokio::test]
    async fn test_certificate_auth_requires_paths() {
        let mut settings = settings();
        settings.auth_method = AuthMethod::Certificate;
        let manager = SessionManager::new(MockTransportFactory::new(MockServer::new()), settings.clone());
        assert!(matches!(
            manager.connect().await.unwrap_err(),
            OpcUaError::Authentication(AuthenticationError::MissingCertificate)
        ));

        settings.certificate = Some("/nonexistent/cert.pem".into());
        let manager = SessionManager::new(MockTransportFactory::new(MockServer::new()), settings.clone());
        assert!(matches!(
            manager.connect().await.unwrap_err(),
            OpcUaError::Authentication(AuthenticationError::MissingPrivateKey)
        ));

        settings.private_key = Some("/nonexistent/key.pem".into());
        let manager = SessionManager::new(MockTransportFactory::new(MockServer::new()), settings);
        assert!(matches!(
            manager.connect().await.unwrap_err(),
            OpcUaError::Authentication(AuthenticationError::Unreadable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let server = MockServer::new();
        server.set_connect_delay(Duration::from_secs(60));
        let manager = SessionManager::new(MockTransportFactory::new(server.clone()), settings());

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, OpcUaError::Timeout(TimeoutError::Connect { .. })));
        assert_eq!(server.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let server = MockServer::new();
        server.set_value(NodeId::numeric(1, 1), crate::client::OpcUaValue::Int32(1));
        server.set_read_delay(Duration::from_secs(30));
        let manager = SessionManager::new(MockTransportFactory::new(server), settings());

        let session = manager.connect().await.unwrap();
        let err = session.read(&[NodeId::numeric(1, 1)]).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Timeout(TimeoutError::Request { operation: "read", .. })));
        assert!(err.requires_reconnect());
    }

    #[tokio::test]
    async fn test_reconnect_is_full_handshake() {
        let server = MockServer::new();
        let manager = SessionManager::new(MockTransportFactory::new(server.clone()), settings());

        let mut first = manager.connect().await.unwrap();
        first.close().await.unwrap();
        let _second = manager.connect().await.unwrap();

        assert_eq!(server.endpoint_requests(), 2);
        assert_eq!(server.connect_count(), 2);
    }
}
