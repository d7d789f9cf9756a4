//! bemcp Library
//!
//! Resilient client sessions for MCP (Model Context Protocol) servers:
//! - Connect with bounded retries
//! - Transparent one-shot reconnect when a session drops
//! - Many named servers behind one cleanup scope

pub mod logging;
pub mod mcp;

pub use mcp::{
    ConnectionState, McpClientError, McpClientResult, RetryPolicy, ServerConfig, ServersFile,
    SessionClient, SessionManager,
};
