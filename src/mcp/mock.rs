//! Mock connector for testing
//!
//! MockConnector stands in for a real server so the session lifecycle can be
//! exercised without spawning processes. Behavior is scripted per endpoint
//! (see [`ServerConfig::endpoint`]) and every transport/session call is
//! recorded so tests can assert on ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::SessionError;
use super::scope::Teardown;
use super::server_config::ServerConfig;
use super::session::{Connector, ProtocolSession};
use super::tools::{ContentBlock, ResourceDescriptor, ResourceReadout, ToolDescriptor, ToolOutput};

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    TransportOpened,
    SessionOpened,
    Initialized,
    ListTools,
    CallTool(String),
    ListResources,
    ReadResource(String),
    SessionReleased,
    TransportReleased,
}

#[derive(Debug, Default)]
struct ServerScript {
    transport_failures: VecDeque<SessionError>,
    handshake_failures: VecDeque<SessionError>,
    op_failures: VecDeque<SessionError>,
    tool_results: VecDeque<ToolOutput>,
    tools: Vec<ToolDescriptor>,
    resources: Vec<ResourceDescriptor>,
    fail_release: bool,
}

#[derive(Debug, Default)]
struct MockState {
    scripts: HashMap<String, ServerScript>,
    events: Vec<(String, MockEvent)>,
}

impl MockState {
    fn script(&mut self, endpoint: &str) -> &mut ServerScript {
        self.scripts.entry(endpoint.to_string()).or_default()
    }

    fn record(&mut self, endpoint: &str, event: MockEvent) {
        self.events.push((endpoint.to_string(), event));
    }
}

/// Scripted [`Connector`]
///
/// Cloning shares the script and the event log.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next transport open for `endpoint` fail.
    pub fn fail_transport(&self, endpoint: &str, error: SessionError) {
        self.lock().script(endpoint).transport_failures.push_back(error);
    }

    /// Make the next `initialize` for `endpoint` fail.
    pub fn fail_handshake(&self, endpoint: &str, error: SessionError) {
        self.lock().script(endpoint).handshake_failures.push_back(error);
    }

    /// Make the next protocol operation (of any kind) for `endpoint` fail.
    pub fn fail_next_op(&self, endpoint: &str, error: SessionError) {
        self.lock().script(endpoint).op_failures.push_back(error);
    }

    /// Queue a result for the next `call_tool`; unqueued calls echo their input.
    pub fn queue_tool_result(&self, endpoint: &str, output: ToolOutput) {
        self.lock().script(endpoint).tool_results.push_back(output);
    }

    pub fn set_tools(&self, endpoint: &str, tools: Vec<ToolDescriptor>) {
        self.lock().script(endpoint).tools = tools;
    }

    pub fn set_resources(&self, endpoint: &str, resources: Vec<ResourceDescriptor>) {
        self.lock().script(endpoint).resources = resources;
    }

    /// Make every session release for `endpoint` report an error.
    pub fn fail_release(&self, endpoint: &str) {
        self.lock().script(endpoint).fail_release = true;
    }

    /// Events recorded for `endpoint`, oldest first.
    pub fn events(&self, endpoint: &str) -> Vec<MockEvent> {
        self.lock()
            .events
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// All events as `(endpoint, event)`, oldest first.
    pub fn all_events(&self) -> Vec<(String, MockEvent)> {
        self.lock().events.clone()
    }

    /// How many times `event` was recorded for `endpoint`.
    pub fn count(&self, endpoint: &str, event: &MockEvent) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|(e, ev)| e == endpoint && ev == event)
            .count()
    }

    fn begin_op(&self, endpoint: &str, event: MockEvent) -> Result<(), SessionError> {
        let mut state = self.lock();
        state.record(endpoint, event);
        match state.script(endpoint).op_failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Transport handed out by [`MockConnector`]
#[derive(Debug)]
pub struct MockTransport {
    endpoint: String,
    connector: MockConnector,
}

#[async_trait]
impl Teardown for MockTransport {
    async fn release(&self) -> Result<(), SessionError> {
        self.connector
            .lock()
            .record(&self.endpoint, MockEvent::TransportReleased);
        Ok(())
    }
}

/// Session handed out by [`MockConnector`]
#[derive(Debug)]
pub struct MockSession {
    endpoint: String,
    connector: MockConnector,
}

#[async_trait]
impl Teardown for MockSession {
    async fn release(&self) -> Result<(), SessionError> {
        let mut state = self.connector.lock();
        state.record(&self.endpoint, MockEvent::SessionReleased);
        if state.script(&self.endpoint).fail_release {
            return Err(SessionError::Other("session refused to close".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolSession for MockSession {
    async fn initialize(&self) -> Result<(), SessionError> {
        let mut state = self.connector.lock();
        if let Some(e) = state.script(&self.endpoint).handshake_failures.pop_front() {
            return Err(e);
        }
        state.record(&self.endpoint, MockEvent::Initialized);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        self.connector.begin_op(&self.endpoint, MockEvent::ListTools)?;
        Ok(self.connector.lock().script(&self.endpoint).tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, SessionError> {
        self.connector
            .begin_op(&self.endpoint, MockEvent::CallTool(name.to_string()))?;

        let queued = self
            .connector
            .lock()
            .script(&self.endpoint)
            .tool_results
            .pop_front();
        Ok(queued.unwrap_or_else(|| {
            ToolOutput::text(format!("{name} {}", Value::Object(arguments)))
        }))
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, SessionError> {
        self.connector
            .begin_op(&self.endpoint, MockEvent::ListResources)?;
        Ok(self.connector.lock().script(&self.endpoint).resources.clone())
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceReadout, SessionError> {
        self.connector
            .begin_op(&self.endpoint, MockEvent::ReadResource(uri.to_string()))?;
        Ok(ResourceReadout {
            contents: vec![ContentBlock::Resource {
                uri: uri.to_string(),
                mime_type: Some("text/plain".into()),
                text: Some(format!("contents of {uri}")),
                blob: None,
            }],
        })
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;
    type Session = MockSession;

    async fn open_transport(
        &self,
        config: &ServerConfig,
    ) -> Result<Arc<MockTransport>, SessionError> {
        let endpoint = config.endpoint();
        let mut state = self.lock();
        if let Some(e) = state.script(&endpoint).transport_failures.pop_front() {
            return Err(e);
        }
        state.record(&endpoint, MockEvent::TransportOpened);

        Ok(Arc::new(MockTransport {
            endpoint,
            connector: self.clone(),
        }))
    }

    async fn open_session(
        &self,
        transport: &Arc<MockTransport>,
    ) -> Result<Arc<MockSession>, SessionError> {
        self.lock()
            .record(&transport.endpoint, MockEvent::SessionOpened);

        Ok(Arc::new(MockSession {
            endpoint: transport.endpoint.clone(),
            connector: self.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_tool_echoes_by_default() {
        let connector = MockConnector::new();
        let config = ServerConfig::subprocess("echo-server");
        let transport = connector.open_transport(&config).await.unwrap();
        let session = connector.open_session(&transport).await.unwrap();
        session.initialize().await.unwrap();

        let mut args = Map::new();
        args.insert("x".into(), json!(1));
        let output = session.call_tool("echo", args).await.unwrap();

        assert_eq!(output.text_content(), r#"echo {"x":1}"#);
        assert_eq!(
            connector.events("echo-server"),
            vec![
                MockEvent::TransportOpened,
                MockEvent::SessionOpened,
                MockEvent::Initialized,
                MockEvent::CallTool("echo".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_once() {
        let connector = MockConnector::new();
        connector.fail_transport("srv", SessionError::TransportOpen("no such file".into()));

        let config = ServerConfig::subprocess("srv");
        assert!(connector.open_transport(&config).await.is_err());
        assert!(connector.open_transport(&config).await.is_ok());
        assert_eq!(connector.count("srv", &MockEvent::TransportOpened), 1);
    }
}
