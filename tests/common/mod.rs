//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bemcp::mcp::{
    MockConnector, RetryPolicy, ServerConfig, SessionClient, SessionError, SessionManager,
};
use serde_json::{Map, Value};

/// Endpoint of the scripted subprocess server used across tests
pub const RUN_SERVER: &str = "run-server serve";

pub fn run_server_config() -> ServerConfig {
    ServerConfig::subprocess("run-server").with_args(["serve"])
}

/// Default policy shape (2 retries, 1s) so paused-clock tests can count delays.
pub fn one_second_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_secs(1))
}

pub fn client(connector: &MockConnector, config: ServerConfig) -> SessionClient<MockConnector> {
    SessionClient::with_connector(config, Arc::new(connector.clone()))
        .with_retry_policy(one_second_policy())
}

pub fn manager(connector: &MockConnector) -> SessionManager<MockConnector> {
    SessionManager::with_connector(Arc::new(connector.clone()))
        .with_retry_policy(RetryPolicy::none())
}

/// Protocol error the way a server reports a dropped peer
pub fn peer_closed() -> SessionError {
    SessionError::protocol(-32000, "connection closed by peer")
}

/// Turn a `json!({...})` literal into tool arguments.
pub fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("tool arguments must be an object, got {other}"),
    }
}
