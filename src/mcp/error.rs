//! MCP Client errors
//!
//! Error types shared by the session client, the reconnect guard and the
//! multi-server manager.

use super::server_config::ConfigError;
use thiserror::Error;

/// Failures reported by the transport or protocol session.
///
/// `ConnectionLost` and `TransportBroken` mark a session that can no longer
/// carry traffic; everything else describes a single failed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The peer closed the session or the transport shut down.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The transport's read or write side is unusable.
    #[error("transport broken: {0}")]
    TransportBroken(String),

    /// The transport could not be opened (spawn failure, bad URL, ...).
    #[error("failed to open transport: {0}")]
    TransportOpen(String),

    /// The `initialize` handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server answered with a protocol-level error.
    #[error("protocol error [{code}]: {message}")]
    Protocol { code: i32, message: String },

    /// The request was cancelled before a response arrived.
    #[error("request cancelled: {0}")]
    Cancelled(String),

    /// Anything the session reports that has no better category.
    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Build a protocol error from a code and message.
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }
}

/// MCP Client errors
#[derive(Debug, Error)]
pub enum McpClientError {
    /// The server configuration is invalid or ambiguous.
    #[error("invalid server configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A protocol operation was attempted without a live session.
    #[error("not connected to any server")]
    NotConnected,

    /// No server is registered under the given name.
    #[error("server '{0}' not found")]
    ServerNotFound(String),

    /// A failure raised by the transport or protocol session.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// MCP Client result type
pub type McpClientResult<T> = Result<T, McpClientError>;
