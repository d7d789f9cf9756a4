//! Session collaborator traits
//!
//! The seam between the lifecycle layer and whatever actually speaks the
//! protocol. [`Connector`] opens a transport and a session over it; the
//! session performs the handshake and serves the four protocol operations.
//! Both are [`Teardown`] resources so a client's scope can release them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::SessionError;
use super::scope::Teardown;
use super::server_config::ServerConfig;
use super::tools::{ResourceDescriptor, ResourceReadout, ToolDescriptor, ToolOutput};

/// A protocol session over an open transport.
#[async_trait]
pub trait ProtocolSession: Teardown {
    /// Run the `initialize` handshake. Must succeed before any other call.
    async fn initialize(&self) -> Result<(), SessionError>;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, SessionError>;

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, SessionError>;

    async fn read_resource(&self, uri: &str) -> Result<ResourceReadout, SessionError>;
}

/// Factory for transports and the sessions built on them.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Duplex channel to the server (subprocess pipe or HTTP stream)
    type Transport: Teardown + 'static;

    /// Protocol session carried by a transport
    type Session: ProtocolSession + 'static;

    /// Acquire the transport described by `config`.
    async fn open_transport(
        &self,
        config: &ServerConfig,
    ) -> Result<Arc<Self::Transport>, SessionError>;

    /// Build an (uninitialized) session over `transport`.
    async fn open_session(
        &self,
        transport: &Arc<Self::Transport>,
    ) -> Result<Arc<Self::Session>, SessionError>;
}
