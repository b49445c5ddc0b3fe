//! The public MCP client: named server registration, connection lifecycle,
//! tool discovery, tool calls, and reconnection with backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use xkit_core::config::{McpClientConfig, ServerDescriptorConfig};
use xkit_core::ids::{ServerName, ToolName};
use xkit_core::ports::{ClockPort, HttpPort, ProcessPort};
use xkit_events::bus::EventBus;
use xkit_events::catalog;

use crate::backoff::Backoff;
use crate::connection::{ConnectionState, ServerConnection};
use crate::error::{McpError, McpResult};
use crate::types::{ToolDefinition, ToolResult};

struct Inner {
    config: McpClientConfig,
    process_port: Arc<dyn ProcessPort>,
    http_port: Arc<dyn HttpPort>,
    clock: Arc<dyn ClockPort>,
    events: Option<EventBus>,
    connections: RwLock<HashMap<ServerName, Arc<ServerConnection>>>,
    reconnect_tasks: Mutex<HashMap<ServerName, JoinHandle<()>>>,
}

/// MCP client managing a set of named server connections.
#[derive(Clone)]
pub struct McpClient {
    inner: Arc<Inner>,
}

impl McpClient {
    /// Create a new client. `events`, when set, receives `ServerConnected`,
    /// `ServerDisconnected`, and `ToolsChanged` notifications.
    #[must_use]
    pub fn new(
        config: McpClientConfig,
        process_port: Arc<dyn ProcessPort>,
        http_port: Arc<dyn HttpPort>,
        clock: Arc<dyn ClockPort>,
        events: Option<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                process_port,
                http_port,
                clock,
                events,
                connections: RwLock::new(HashMap::new()),
                reconnect_tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a server under `name`. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::DuplicateServer`] if `name` is already registered.
    pub async fn register(&self, name: ServerName, descriptor: ServerDescriptorConfig) -> McpResult<()> {
        let mut connections = self.inner.connections.write().await;
        if connections.contains_key(&name) {
            return Err(McpError::DuplicateServer(name));
        }
        let default_call_deadline = Duration::from_millis(self.inner.config.default_call_deadline_ms);
        let connection = ServerConnection::new(
            name.clone(),
            descriptor,
            self.inner.process_port.clone(),
            self.inner.http_port.clone(),
            self.inner.events.clone(),
            default_call_deadline,
        );
        connections.insert(name, connection);
        Ok(())
    }

    async fn connection(&self, name: &ServerName) -> McpResult<Arc<ServerConnection>> {
        self.inner
            .connections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::UnknownServer(name.clone()))
    }

    /// Connect a registered server: establish the transport and run the
    /// handshake and initial tool discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unregistered or the connection
    /// attempt fails.
    pub async fn connect(&self, name: &ServerName) -> McpResult<()> {
        let connection = self.connection(name).await?;
        let deadline = Duration::from_millis(self.inner.config.handshake_deadline_ms);
        connection.connect(deadline).await?;
        self.publish(catalog::SERVER_CONNECTED, name).await;
        Ok(())
    }

    /// List tools discovered on a connected server.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownServer`] if `name` is not registered.
    pub async fn list_tools(&self, name: &ServerName) -> McpResult<Vec<ToolDefinition>> {
        let connection = self.connection(name).await?;
        Ok(connection.tools().await)
    }

    /// Call a tool on a server, using the client's default call deadline.
    ///
    /// On a transport failure, a reconnect loop is started in the
    /// background; the failing call still returns its error immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unregistered, not connected, the
    /// tool is unknown, the call times out, or the server reports failure.
    pub async fn call_tool(&self, name: &ServerName, tool: &ToolName, arguments: Value) -> McpResult<ToolResult> {
        let connection = self.connection(name).await?;
        let deadline = Duration::from_millis(self.inner.config.default_call_deadline_ms);
        let result = connection.call_tool(tool, arguments, deadline).await;

        if let Err(McpError::Transport { .. } | McpError::NotConnected(_)) = &result {
            self.spawn_reconnect_loop(name.clone(), connection).await;
        }

        result
    }

    /// Disconnect a server and cancel any pending reconnect attempt.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownServer`] if `name` is not registered.
    pub async fn disconnect(&self, name: &ServerName) -> McpResult<()> {
        let connection = self.connection(name).await?;
        if let Some(handle) = self.inner.reconnect_tasks.lock().await.remove(name) {
            handle.abort();
        }
        connection.disconnect().await;
        self.publish(catalog::SERVER_DISCONNECTED, name).await;
        Ok(())
    }

    /// Currently registered server names.
    pub async fn registered_servers(&self) -> Vec<ServerName> {
        self.inner.connections.read().await.keys().cloned().collect()
    }

    /// Lifecycle state of a registered server.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::UnknownServer`] if `name` is not registered.
    pub async fn server_state(&self, name: &ServerName) -> McpResult<ConnectionState> {
        Ok(self.connection(name).await?.state().await)
    }

    async fn spawn_reconnect_loop(&self, name: ServerName, connection: Arc<ServerConnection>) {
        let mut tasks = self.inner.reconnect_tasks.lock().await;
        if tasks.contains_key(&name) {
            return;
        }

        let clock = self.inner.clock.clone();
        let handshake_deadline = Duration::from_millis(self.inner.config.handshake_deadline_ms);
        let client = self.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut backoff = Backoff::new();
            loop {
                let delay = backoff.next_delay();
                clock.sleep(delay).await;

                let before = connection.tools().await;
                match connection.connect(handshake_deadline).await {
                    Ok(()) => {
                        info!(server = %task_name, "reconnected");
                        client.publish(catalog::SERVER_CONNECTED, &task_name).await;
                        let after = connection.tools().await;
                        if tool_names(&before) != tool_names(&after) {
                            client.publish(catalog::TOOLS_CHANGED, &task_name).await;
                        }
                        client.inner.reconnect_tasks.lock().await.remove(&task_name);
                        return;
                    },
                    Err(err) => {
                        warn!(server = %task_name, %err, attempt = backoff.attempt(), "reconnect attempt failed");
                    },
                }
            }
        });

        tasks.insert(name, handle);
    }

    async fn publish(&self, event_type: &str, server: &ServerName) {
        let Some(events) = &self.inner.events else {
            return;
        };
        let Ok(event_type) = xkit_core::ids::EventTypeName::new(event_type) else {
            return;
        };
        let payload = serde_json::json!({ "server": server.as_str() });
        let _ = events.publish(event_type, payload, None).await;
    }
}

fn tool_names(tools: &[ToolDefinition]) -> Vec<String> {
    let mut names: Vec<String> = tools.iter().map(|t| t.name.as_str().to_string()).collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use xkit_core::config::RestartConfig;

    fn descriptor() -> ServerDescriptorConfig {
        ServerDescriptorConfig::ChildProcess {
            command: "echo-server".to_string(),
            args: vec![],
            env: StdHashMap::new(),
            cwd: None,
            restart: RestartConfig::default(),
        }
    }

    struct NoopProcessPort;
    #[async_trait::async_trait]
    impl ProcessPort for NoopProcessPort {
        async fn spawn(
            &self,
            _spec: xkit_core::ports::ProcessSpec,
        ) -> Result<Box<dyn xkit_core::ports::ChildProcess>, xkit_core::error::PortError> {
            Err(xkit_core::error::PortError::ProcessExited)
        }
    }

    struct NoopHttpPort;
    #[async_trait::async_trait]
    impl HttpPort for NoopHttpPort {
        async fn post_json(
            &self,
            _request: xkit_core::ports::HttpRequest,
        ) -> Result<xkit_core::ports::HttpResponse, xkit_core::error::PortError> {
            Err(xkit_core::error::PortError::ProcessExited)
        }

        async fn stream_events(
            &self,
            _url: &str,
            _headers: StdHashMap<String, String>,
        ) -> Result<tokio::sync::mpsc::Receiver<Value>, xkit_core::error::PortError> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }
    }

    struct FixedClock;
    #[async_trait::async_trait]
    impl ClockPort for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::Utc::now()
        }
        async fn sleep(&self, _duration: Duration) {}
    }

    fn client() -> McpClient {
        McpClient::new(
            McpClientConfig::default(),
            Arc::new(NoopProcessPort),
            Arc::new(NoopHttpPort),
            Arc::new(FixedClock),
            None,
        )
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let client = client();
        let name = ServerName::new("echo").unwrap();
        client.register(name.clone(), descriptor()).await.unwrap();
        let err = client.register(name, descriptor()).await.unwrap_err();
        assert!(matches!(err, McpError::DuplicateServer(_)));
    }

    #[tokio::test]
    async fn unregistered_server_is_unknown() {
        let client = client();
        let name = ServerName::new("ghost").unwrap();
        let err = client.connect(&name).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownServer(_)));
    }

    #[tokio::test]
    async fn connect_failure_surfaces_transport_error() {
        let client = client();
        let name = ServerName::new("echo").unwrap();
        client.register(name.clone(), descriptor()).await.unwrap();
        let err = client.connect(&name).await.unwrap_err();
        assert!(matches!(err, McpError::Transport { .. }));
    }
}
