//! MCP Session Manager
//!
//! Manages multiple named server sessions under one cleanup scope.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::client::SessionClient;
use super::error::{McpClientError, McpClientResult};
use super::retry::RetryPolicy;
use super::server_config::{ServerConfig, ServersFile};
use super::session::Connector;
use super::tools::{ResourceDescriptor, ResourceReadout, ToolDescriptor, ToolOutput};
use super::transport::RmcpConnector;

/// Shared handle to a managed client; the mutex serializes callers.
pub type SessionHandle<C = RmcpConnector> = Arc<Mutex<SessionClient<C>>>;

/// MCP Session Manager
///
/// Every client added here stays owned by the manager until [`cleanup`]
/// releases it, including clients dropped from the registry by [`remove`].
///
/// [`cleanup`]: SessionManager::cleanup
/// [`remove`]: SessionManager::remove
pub struct SessionManager<C: Connector = RmcpConnector> {
    connector: Arc<C>,

    /// Retry policy handed to every new client
    retry: RetryPolicy,

    /// Registered clients (name -> handle), in registration order
    clients: IndexMap<String, SessionHandle<C>>,

    /// Every client not yet released, in registration order
    owned: Vec<(String, SessionHandle<C>)>,
}

impl SessionManager<RmcpConnector> {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(RmcpConnector::new()))
    }
}

impl Default for SessionManager<RmcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SessionManager<C> {
    pub fn with_connector(connector: Arc<C>) -> Self {
        Self {
            connector,
            retry: RetryPolicy::default(),
            clients: IndexMap::new(),
            owned: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connect to a server and register it under `name`.
    ///
    /// An existing registration wins: the call logs and returns `Ok` without
    /// looking at `config`. On connect failure nothing is registered.
    pub async fn add(&mut self, name: impl Into<String>, config: ServerConfig) -> McpClientResult<()> {
        let name = name.into();
        if self.clients.contains_key(&name) {
            tracing::info!(server = %name, "server already registered");
            return Ok(());
        }

        let mut client = SessionClient::with_connector(config, Arc::clone(&self.connector))
            .named(name.clone())
            .with_retry_policy(self.retry);
        client.connect().await?;

        let handle = Arc::new(Mutex::new(client));
        self.clients.insert(name.clone(), Arc::clone(&handle));
        self.owned.push((name.clone(), handle));

        tracing::info!(server = %name, "added server");
        Ok(())
    }

    /// Add every server in `file`, in file order.
    ///
    /// Failures are collected rather than aborting the remaining servers.
    pub async fn add_all(&mut self, file: &ServersFile) -> Vec<(String, McpClientError)> {
        let mut failures = Vec::new();

        for (name, config) in &file.servers {
            if let Err(e) = self.add(name.clone(), config.clone()).await {
                tracing::error!(server = %name, error = %e, "failed to add server");
                failures.push((name.clone(), e));
            }
        }

        failures
    }

    /// Drop `name` from the registry.
    ///
    /// The client's session stays open until [`cleanup`](Self::cleanup); use
    /// [`shutdown`](Self::shutdown) to release it now.
    pub fn remove(&mut self, name: &str) -> bool {
        if self.clients.shift_remove(name).is_none() {
            return false;
        }
        tracing::info!(server = %name, "removed server; session is released on cleanup");
        true
    }

    /// Drop `name` from the registry and release its session immediately.
    pub async fn shutdown(&mut self, name: &str) -> bool {
        let Some(handle) = self.clients.shift_remove(name) else {
            return false;
        };
        self.owned.retain(|(_, owned)| !Arc::ptr_eq(owned, &handle));

        handle.lock().await.disconnect().await;
        tracing::info!(server = %name, "shut down server");
        true
    }

    /// Release every owned client, newest first, and empty the registry.
    pub async fn cleanup(&mut self) {
        self.clients.clear();
        if self.owned.is_empty() {
            return;
        }

        let count = self.owned.len();
        while let Some((name, handle)) = self.owned.pop() {
            handle.lock().await.disconnect().await;
            tracing::debug!(server = %name, "released server");
        }

        tracing::info!(count, "cleaned up all servers");
    }

    /// Tools of every registered server.
    ///
    /// Servers that fail to answer are logged and left out. A server whose
    /// session could not be re-established is unregistered.
    pub async fn list_all_tools(&mut self) -> IndexMap<String, Vec<ToolDescriptor>> {
        let mut tools_map = IndexMap::new();
        let mut lost = Vec::new();

        for (name, handle) in &self.clients {
            let mut client = handle.lock().await;
            match client.list_tools().await {
                Ok(tools) => {
                    tools_map.insert(name.clone(), tools);
                }
                Err(e) => {
                    tracing::error!(server = %name, error = %e, "failed to list tools");
                }
            }
            if !client.is_connected() {
                lost.push(name.clone());
            }
        }

        self.unregister_all(lost);
        tools_map
    }

    /// Resources of every registered server; failures are handled like
    /// [`list_all_tools`](Self::list_all_tools).
    pub async fn list_all_resources(&mut self) -> IndexMap<String, Vec<ResourceDescriptor>> {
        let mut resources_map = IndexMap::new();
        let mut lost = Vec::new();

        for (name, handle) in &self.clients {
            let mut client = handle.lock().await;
            match client.list_resources().await {
                Ok(resources) => {
                    resources_map.insert(name.clone(), resources);
                }
                Err(e) => {
                    tracing::error!(server = %name, error = %e, "failed to list resources");
                }
            }
            if !client.is_connected() {
                lost.push(name.clone());
            }
        }

        self.unregister_all(lost);
        resources_map
    }

    /// Call a tool on a specific server
    pub async fn call_tool(
        &mut self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> McpClientResult<ToolOutput> {
        let handle = Arc::clone(self.handle(server)?);
        let mut client = handle.lock().await;
        let result = client.call_tool(tool, arguments).await;
        if !client.is_connected() {
            self.unregister(server);
        }
        result
    }

    /// Read a resource from a specific server
    pub async fn read_resource(
        &mut self,
        server: &str,
        uri: &str,
    ) -> McpClientResult<ResourceReadout> {
        let handle = Arc::clone(self.handle(server)?);
        let mut client = handle.lock().await;
        let result = client.read_resource(uri).await;
        if !client.is_connected() {
            self.unregister(server);
        }
        result
    }

    /// Get a client handle by name
    pub fn get(&self, name: &str) -> Option<SessionHandle<C>> {
        self.clients.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Registered names, in registration order
    pub fn server_names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop a client that lost its session from the registry. It stays owned
    /// so [`cleanup`](Self::cleanup) still releases it.
    fn unregister(&mut self, name: &str) {
        if self.clients.shift_remove(name).is_some() {
            tracing::warn!(server = %name, "server disconnected; unregistered until added again");
        }
    }

    fn unregister_all(&mut self, names: Vec<String>) {
        for name in names {
            self.unregister(&name);
        }
    }

    fn handle(&self, server: &str) -> McpClientResult<&SessionHandle<C>> {
        self.clients
            .get(server)
            .ok_or_else(|| McpClientError::ServerNotFound(server.to_string()))
    }
}

impl<C: Connector> Drop for SessionManager<C> {
    fn drop(&mut self) {
        if !self.owned.is_empty() {
            tracing::warn!(
                servers = ?self.owned.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
                "session manager dropped without cleanup"
            );
        }
    }
}
