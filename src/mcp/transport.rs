//! rmcp-backed transports and sessions
//!
//! Subprocess servers run through `TokioChildProcess`, stream servers through
//! the streamable HTTP client. The transport only holds the channel until a
//! session takes it; the session hands it to `serve`, which performs the
//! `initialize` handshake and owns the channel from then on.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, ClientInfo, ReadResourceRequestParam},
    service::{Peer, RunningService},
    transport::{
        streamable_http_client::StreamableHttpClientTransportConfig,
        StreamableHttpClientTransport, TokioChildProcess,
    },
    RoleClient, ServiceError, ServiceExt,
};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;

use super::error::SessionError;
use super::scope::Teardown;
use super::server_config::ServerConfig;
use super::session::{Connector, ProtocolSession};
use super::tools::{ResourceDescriptor, ResourceReadout, ToolDescriptor, ToolOutput};

/// Stream parameter carrying a bearer token
pub const AUTH_TOKEN_PARAM: &str = "auth_token";

type ClientService = RunningService<RoleClient, ClientInfo>;

/// A channel that has not been served yet
enum Channel {
    Child(TokioChildProcess),
    Http(StreamableHttpClientTransport<reqwest::Client>),
}

impl Channel {
    async fn serve(self) -> Result<ClientService, SessionError> {
        let client_info = ClientInfo::default();
        let served = match self {
            Channel::Child(transport) => client_info.serve(transport).await,
            Channel::Http(transport) => client_info.serve(transport).await,
        };
        served.map_err(|e| SessionError::Handshake(e.to_string()))
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Map an SDK service error onto the session error taxonomy.
pub fn session_error(err: ServiceError) -> SessionError {
    match err {
        ServiceError::McpError(data) => SessionError::protocol(data.code.0, data.message),
        ServiceError::TransportClosed => SessionError::ConnectionLost("transport closed".into()),
        ServiceError::TransportSend(e) => SessionError::TransportBroken(e.to_string()),
        ServiceError::Cancelled { reason } => {
            SessionError::Cancelled(reason.unwrap_or_else(|| "no reason given".into()))
        }
        other => SessionError::Other(other.to_string()),
    }
}

/// Transport opened for one connect attempt
pub struct RmcpTransport {
    endpoint: String,
    channel: Mutex<Option<Channel>>,
}

impl RmcpTransport {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Teardown for RmcpTransport {
    async fn release(&self) -> Result<(), SessionError> {
        // Once served, the running session owns the channel and closes it.
        if take(&self.channel).is_some() {
            tracing::debug!(endpoint = %self.endpoint, "dropped unserved transport");
        }
        Ok(())
    }
}

/// Session served over an [`RmcpTransport`]
pub struct RmcpSession {
    endpoint: String,
    pending: Mutex<Option<Channel>>,
    service: AsyncMutex<Option<ClientService>>,
}

impl RmcpSession {
    async fn peer(&self) -> Result<Peer<RoleClient>, SessionError> {
        self.service
            .lock()
            .await
            .as_ref()
            .map(|service| service.peer().clone())
            .ok_or_else(|| SessionError::Other("session is not initialized".into()))
    }
}

#[async_trait]
impl Teardown for RmcpSession {
    async fn release(&self) -> Result<(), SessionError> {
        drop(take(&self.pending));

        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };

        let reason = service
            .cancel()
            .await
            .map_err(|e| SessionError::Other(format!("session task failed: {e}")))?;
        tracing::debug!(endpoint = %self.endpoint, ?reason, "session closed");
        Ok(())
    }
}

#[async_trait]
impl ProtocolSession for RmcpSession {
    async fn initialize(&self) -> Result<(), SessionError> {
        let channel = take(&self.pending)
            .ok_or_else(|| SessionError::Handshake("session was already initialized".into()))?;

        let service = channel.serve().await?;

        if let Some(info) = service.peer().peer_info() {
            tracing::info!(
                endpoint = %self.endpoint,
                server = %info.server_info.name,
                version = %info.server_info.version,
                "initialized session"
            );
        }

        *self.service.lock().await = Some(service);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        let tools = self
            .peer()
            .await?
            .list_all_tools()
            .await
            .map_err(session_error)?;
        Ok(tools.iter().map(ToolDescriptor::from_tool).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, SessionError> {
        let params = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments),
            task: None,
        };

        let result = self
            .peer()
            .await?
            .call_tool(params)
            .await
            .map_err(session_error)?;
        Ok(ToolOutput::from_result(&result))
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, SessionError> {
        let resources = self
            .peer()
            .await?
            .list_all_resources()
            .await
            .map_err(session_error)?;
        Ok(resources
            .iter()
            .map(ResourceDescriptor::from_resource)
            .collect())
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceReadout, SessionError> {
        let result = self
            .peer()
            .await?
            .read_resource(ReadResourceRequestParam {
                uri: uri.to_string(),
            })
            .await
            .map_err(session_error)?;
        Ok(ResourceReadout::from_result(&result))
    }
}

/// [`Connector`] backed by the rmcp SDK
#[derive(Debug, Clone, Copy, Default)]
pub struct RmcpConnector;

impl RmcpConnector {
    pub fn new() -> Self {
        Self
    }

    fn open_channel(config: &ServerConfig) -> Result<Channel, SessionError> {
        match config {
            ServerConfig::Subprocess { command, args, env } => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                if let Some(env) = env {
                    cmd.envs(env);
                }

                // TokioChildProcess::new takes ownership of Command and spawns it
                let transport = TokioChildProcess::new(cmd)
                    .map_err(|e| SessionError::TransportOpen(format!("{command}: {e}")))?;
                Ok(Channel::Child(transport))
            }
            ServerConfig::Stream { url, .. } => {
                let transport = match config.param_str(AUTH_TOKEN_PARAM) {
                    Some(token) => StreamableHttpClientTransport::from_config(
                        StreamableHttpClientTransportConfig::with_uri(url.as_str())
                            .auth_header(token),
                    ),
                    None => StreamableHttpClientTransport::from_uri(url.as_str()),
                };
                Ok(Channel::Http(transport))
            }
        }
    }
}

#[async_trait]
impl Connector for RmcpConnector {
    type Transport = RmcpTransport;
    type Session = RmcpSession;

    async fn open_transport(
        &self,
        config: &ServerConfig,
    ) -> Result<Arc<RmcpTransport>, SessionError> {
        let channel = Self::open_channel(config)?;
        tracing::debug!(endpoint = %config.endpoint(), "opened transport");
        Ok(Arc::new(RmcpTransport {
            endpoint: config.endpoint(),
            channel: Mutex::new(Some(channel)),
        }))
    }

    async fn open_session(
        &self,
        transport: &Arc<RmcpTransport>,
    ) -> Result<Arc<RmcpSession>, SessionError> {
        let channel = take(&transport.channel).ok_or_else(|| {
            SessionError::TransportBroken("transport is already bound to a session".into())
        })?;
        Ok(Arc::new(RmcpSession {
            endpoint: transport.endpoint.clone(),
            pending: Mutex::new(Some(channel)),
            service: AsyncMutex::new(None),
        }))
    }
}
