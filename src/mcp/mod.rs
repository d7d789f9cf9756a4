//! MCP (Model Context Protocol) session layer
//!
//! Keeps client sessions to MCP servers alive and accounted for:
//! - [`SessionClient`]: one server, connect/disconnect plus tool and resource calls
//! - [`SessionManager`]: many named clients behind one cleanup scope
//! - [`RetryPolicy`] and the [`reconnect`] guard: the two recovery paths
//!
//! The protocol itself is spoken by rmcp through [`RmcpConnector`]; anything
//! implementing [`Connector`] can stand in for it.

use std::fmt;

pub mod client;
pub mod error;
pub mod manager;
pub mod mock;
pub mod reconnect;
pub mod retry;
pub mod scope;
pub mod server_config;
pub mod session;
pub mod tools;
pub mod transport;

pub use client::SessionClient;
pub use error::{McpClientError, McpClientResult, SessionError};
pub use manager::{SessionHandle, SessionManager};
pub use mock::{MockConnector, MockEvent};
pub use reconnect::{classify, FailureKind, Reconnect};
pub use retry::RetryPolicy;
pub use scope::{Teardown, TeardownScope};
pub use server_config::{ConfigError, RawServerConfig, ServerConfig, ServersFile};
pub use session::{Connector, ProtocolSession};
pub use tools::{
    format_tool_output, ContentBlock, ResourceDescriptor, ResourceReadout, ToolDescriptor,
    ToolOutput,
};
pub use transport::RmcpConnector;

/// Connection state of a [`SessionClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session; initial and terminal state
    #[default]
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// Handshake complete, session usable
    Connected,
}

impl ConnectionState {
    /// Whether a session exists or is being established
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}
