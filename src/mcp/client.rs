//! MCP Session Client
//!
//! Provides one managed connection to an MCP server:
//! - Connect with bounded retries, releasing partial acquisitions per attempt
//! - Best-effort disconnect in reverse acquisition order
//! - Tool and resource operations guarded against connection loss

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::error::{McpClientError, McpClientResult, SessionError};
use super::reconnect::{self, Reconnect};
use super::retry::RetryPolicy;
use super::scope::TeardownScope;
use super::server_config::{RawServerConfig, ServerConfig};
use super::session::{Connector, ProtocolSession};
use super::tools::{ResourceDescriptor, ResourceReadout, ToolDescriptor, ToolOutput};
use super::transport::RmcpConnector;
use super::ConnectionState;

/// Client for a single MCP server
pub struct SessionClient<C: Connector = RmcpConnector> {
    /// Name used in diagnostics
    label: String,

    /// Server configuration, fixed for the client's lifetime
    config: ServerConfig,

    connector: Arc<C>,

    /// Applied to `connect()`; reconnects always make a single attempt
    retry: RetryPolicy,

    state: ConnectionState,

    /// Present exactly when `state` is `Connected`
    session: Option<Arc<C::Session>>,

    /// Transport then session, released in reverse
    scope: TeardownScope,
}

impl SessionClient<RmcpConnector> {
    /// Create a client that talks to a real server through rmcp.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_connector(config, Arc::new(RmcpConnector::new()))
    }

    /// Validate a raw config entry and create a client for it.
    pub fn from_raw(raw: RawServerConfig) -> McpClientResult<Self> {
        let config = ServerConfig::try_from(raw)?;
        Ok(Self::new(config))
    }
}

impl<C: Connector> SessionClient<C> {
    pub fn with_connector(config: ServerConfig, connector: Arc<C>) -> Self {
        let label = config.endpoint();
        Self {
            scope: TeardownScope::new(label.clone()),
            label,
            config,
            connector,
            retry: RetryPolicy::default(),
            state: ConnectionState::Disconnected,
            session: None,
        }
    }

    /// Set the name used in diagnostics (defaults to the endpoint).
    #[must_use]
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Connect to the server, retrying per the client's policy.
    ///
    /// Returns immediately if already connected.
    pub async fn connect(&mut self) -> McpClientResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let retry = self.retry;
        self.connect_with(retry).await
    }

    async fn connect_with(&mut self, retry: RetryPolicy) -> McpClientResult<()> {
        self.state = ConnectionState::Connecting;
        tracing::debug!(server = %self.label, endpoint = %self.config.endpoint(), "connecting");

        let connector = &*self.connector;
        let config = &self.config;
        let label = self.label.as_str();
        let attempt = retry
            .run("connect", || establish(connector, config, label))
            .await;

        match attempt {
            Ok((session, scope)) => {
                self.session = Some(session);
                self.scope = scope;
                self.state = ConnectionState::Connected;
                tracing::info!(server = %self.label, "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e.into())
            }
        }
    }

    /// Release the session and transport.
    ///
    /// Valid in every state. Release failures are logged, never returned.
    pub async fn disconnect(&mut self) {
        self.session = None;

        let failures = self.scope.close().await;
        if !failures.is_empty() {
            tracing::debug!(server = %self.label, failures = failures.len(), "disconnected with release errors");
        }

        if self.state.is_active() {
            tracing::info!(server = %self.label, "disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    pub async fn list_tools(&mut self) -> McpClientResult<Vec<ToolDescriptor>> {
        self.ensure_connected()?;
        reconnect::guard(self, "list_tools", |client: &Self| {
            let session = client.live_session();
            async move { session?.list_tools().await.map_err(McpClientError::from) }
        })
        .await
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> McpClientResult<ToolOutput> {
        self.ensure_connected()?;
        tracing::debug!(server = %self.label, tool = name, "calling tool");
        reconnect::guard(self, "call_tool", |client: &Self| {
            let session = client.live_session();
            let arguments = arguments.clone();
            async move {
                session?
                    .call_tool(name, arguments)
                    .await
                    .map_err(McpClientError::from)
            }
        })
        .await
    }

    pub async fn list_resources(&mut self) -> McpClientResult<Vec<ResourceDescriptor>> {
        self.ensure_connected()?;
        reconnect::guard(self, "list_resources", |client: &Self| {
            let session = client.live_session();
            async move { session?.list_resources().await.map_err(McpClientError::from) }
        })
        .await
    }

    pub async fn read_resource(&mut self, uri: &str) -> McpClientResult<ResourceReadout> {
        self.ensure_connected()?;
        reconnect::guard(self, "read_resource", |client: &Self| {
            let session = client.live_session();
            async move { session?.read_resource(uri).await.map_err(McpClientError::from) }
        })
        .await
    }

    fn ensure_connected(&self) -> McpClientResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(McpClientError::NotConnected)
        }
    }

    fn live_session(&self) -> McpClientResult<Arc<C::Session>> {
        self.session.clone().ok_or(McpClientError::NotConnected)
    }
}

/// One connect attempt. On failure everything it acquired is released.
async fn establish<C: Connector>(
    connector: &C,
    config: &ServerConfig,
    label: &str,
) -> Result<(Arc<C::Session>, TeardownScope), SessionError> {
    let mut scope = TeardownScope::new(label);

    match acquire(connector, config, &mut scope).await {
        Ok(session) => Ok((session, scope)),
        Err(e) => {
            scope.close().await;
            Err(e)
        }
    }
}

async fn acquire<C: Connector>(
    connector: &C,
    config: &ServerConfig,
    scope: &mut TeardownScope,
) -> Result<Arc<C::Session>, SessionError> {
    let transport = connector.open_transport(config).await?;
    scope.push("transport", transport.clone());

    let session = connector.open_session(&transport).await?;
    scope.push("session", session.clone());

    session.initialize().await?;
    Ok(session)
}

#[async_trait::async_trait]
impl<C: Connector> Reconnect for SessionClient<C> {
    fn label(&self) -> &str {
        &self.label
    }

    async fn drop_session(&mut self) {
        self.disconnect().await;
    }

    async fn reestablish(&mut self) -> McpClientResult<()> {
        self.connect_with(RetryPolicy::none()).await
    }
}

impl<C: Connector> fmt::Debug for SessionClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("label", &self.label)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("retry", &self.retry)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::mock::{MockConnector, MockEvent};
    use std::time::Duration;

    fn client(connector: &MockConnector) -> SessionClient<MockConnector> {
        SessionClient::with_connector(
            ServerConfig::subprocess("srv"),
            Arc::new(connector.clone()),
        )
        .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)))
    }

    #[tokio::test]
    async fn test_connect_acquires_transport_then_session() {
        let connector = MockConnector::new();
        let mut client = client(&connector);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.connect().await.unwrap();

        assert!(client.is_connected());
        assert_eq!(
            connector.events("srv"),
            vec![
                MockEvent::TransportOpened,
                MockEvent::SessionOpened,
                MockEvent::Initialized
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_twice_is_noop() {
        let connector = MockConnector::new();
        let mut client = client(&connector);

        client.connect().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(connector.count("srv", &MockEvent::TransportOpened), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_releases_what_it_acquired() {
        let connector = MockConnector::new();
        connector.fail_handshake("srv", SessionError::Handshake("bad version".into()));
        let mut client = client(&connector);

        client.connect().await.unwrap();

        assert_eq!(
            connector.events("srv"),
            vec![
                MockEvent::TransportOpened,
                MockEvent::SessionOpened,
                MockEvent::SessionReleased,
                MockEvent::TransportReleased,
                MockEvent::TransportOpened,
                MockEvent::SessionOpened,
                MockEvent::Initialized,
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let connector = MockConnector::new();
        let mut client = client(&connector);

        client.disconnect().await;
        client.connect().await.unwrap();
        client.disconnect().await;
        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(connector.count("srv", &MockEvent::SessionReleased), 1);
        assert_eq!(connector.count("srv", &MockEvent::TransportReleased), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_after_failed_connect_is_quiet() {
        let connector = MockConnector::new();
        for _ in 0..3 {
            connector.fail_transport("srv", SessionError::TransportOpen("spawn failed".into()));
        }
        let mut client = client(&connector);

        assert!(client.connect().await.is_err());
        assert!(!client.state().is_active());

        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(connector.events("srv").is_empty());
    }

    #[tokio::test]
    async fn test_release_failure_does_not_fail_disconnect() {
        let connector = MockConnector::new();
        connector.fail_release("srv");
        let mut client = client(&connector);

        client.connect().await.unwrap();
        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(connector.count("srv", &MockEvent::TransportReleased), 1);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let connector = MockConnector::new();
        let mut client = client(&connector);

        assert!(matches!(
            client.list_tools().await,
            Err(McpClientError::NotConnected)
        ));
        assert!(matches!(
            client.read_resource("file:///tmp/a").await,
            Err(McpClientError::NotConnected)
        ));
        assert!(connector.events("srv").is_empty());
    }

    #[test]
    fn test_from_raw_rejects_ambiguous_config() {
        let raw = RawServerConfig {
            command: Some("srv".into()),
            url: Some("http://localhost:8000/mcp".into()),
            ..Default::default()
        };
        assert!(matches!(
            SessionClient::from_raw(raw),
            Err(McpClientError::InvalidConfig(_))
        ));
    }
}
