//! A single named server connection: transport, handshake, and the
//! request/response matching needed to serve concurrent tool calls.
//!
//! The child-process transport hands the spawned process to a dedicated
//! reader/writer task so that writes are never blocked behind an in-flight
//! read: callers queue outgoing lines and register a `pending` entry, and
//! whichever response arrives resolves it by id, independent of which
//! caller's task is still awaiting it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use xkit_core::config::{HttpAuthConfig, ServerDescriptorConfig};
use xkit_core::ids::{RequestId, ServerName, ToolName};
use xkit_core::ports::{ChildProcess, HttpPort, HttpRequest, ProcessPort, ProcessSpec};
use xkit_events::bus::EventBus;
use xkit_events::catalog;
use xkit_protocol::codec::{HttpCodec, LineCodec};
use xkit_protocol::message::{Message, NotificationMessage, RequestMessage, ResponseOutcome};

use crate::error::{McpError, McpResult};
use crate::types::{ToolDefinition, ToolResult};

/// Lifecycle of a single server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet connected, or disconnected cleanly.
    Disconnected,
    /// Transport established, handshake in flight.
    Connecting,
    /// Handshake complete; tool calls may be issued.
    Ready,
    /// The transport failed; a reconnect attempt may be pending.
    Failed,
    /// Shutting down; no new calls are accepted.
    Closing,
}

enum Transport {
    /// A line-framed child process. `outbound` feeds a reader/writer task
    /// that owns the process exclusively; sending never waits on a read.
    ChildProcess { outbound: mpsc::UnboundedSender<String> },
    Http {
        port: Arc<dyn HttpPort>,
        base_url: String,
        headers: HashMap<String, String>,
        /// Forwards server-pushed events from the streaming endpoint, if one
        /// was configured. Aborted on disconnect.
        stream_task: Mutex<Option<JoinHandle<()>>>,
    },
}

/// One named MCP server connection.
pub struct ServerConnection {
    name: ServerName,
    descriptor: ServerDescriptorConfig,
    process_port: Arc<dyn ProcessPort>,
    http_port: Arc<dyn HttpPort>,
    events: Option<EventBus>,
    default_call_deadline: Duration,
    line_codec: LineCodec,
    self_ref: Weak<ServerConnection>,
    state: RwLock<ConnectionState>,
    tools: RwLock<Vec<ToolDefinition>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseOutcome>>>>,
    transport: RwLock<Option<Arc<Transport>>>,
}

impl ServerConnection {
    /// Create a connection in the `Disconnected` state.
    ///
    /// `default_call_deadline` bounds requests this connection issues on its
    /// own behalf (handshake, tool discovery, reacting to a pushed
    /// notification) rather than on a caller's behalf.
    #[must_use]
    pub fn new(
        name: ServerName,
        descriptor: ServerDescriptorConfig,
        process_port: Arc<dyn ProcessPort>,
        http_port: Arc<dyn HttpPort>,
        events: Option<EventBus>,
        default_call_deadline: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            name,
            descriptor,
            process_port,
            http_port,
            events,
            default_call_deadline,
            line_codec: LineCodec::default(),
            self_ref: self_ref.clone(),
            state: RwLock::new(ConnectionState::Disconnected),
            tools: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            transport: RwLock::new(None),
        })
    }

    /// The server's registered name.
    #[must_use]
    pub fn name(&self) -> &ServerName {
        &self.name
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// The tool set last discovered from this server.
    pub async fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().await.clone()
    }

    /// Establish the transport and run the `initialize`/`initialized`
    /// handshake, then discover tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established or the
    /// handshake does not complete.
    pub async fn connect(&self, handshake_deadline: Duration) -> McpResult<()> {
        *self.state.write().await = ConnectionState::Connecting;

        let transport = self.establish_transport().await?;
        *self.transport.write().await = Some(Arc::new(transport));

        if let Err(err) = self.handshake(handshake_deadline).await {
            *self.state.write().await = ConnectionState::Failed;
            return Err(err);
        }

        if let Err(err) = self.refresh_tools(handshake_deadline).await {
            *self.state.write().await = ConnectionState::Failed;
            return Err(err);
        }

        *self.state.write().await = ConnectionState::Ready;
        Ok(())
    }

    async fn establish_transport(&self) -> McpResult<Transport> {
        match &self.descriptor {
            ServerDescriptorConfig::ChildProcess {
                command, args, env, cwd, ..
            } => {
                let spec = ProcessSpec {
                    command: command.clone(),
                    args: args.clone(),
                    env: env.clone(),
                    cwd: cwd.clone(),
                };
                let child = self
                    .process_port
                    .spawn(spec)
                    .await
                    .map_err(|source| McpError::Transport {
                        server: self.name.clone(),
                        source,
                    })?;
                Ok(Transport::ChildProcess {
                    outbound: self.spawn_child_actor(child),
                })
            },
            ServerDescriptorConfig::Http {
                base_url, auth, streaming_path, ..
            } => {
                let mut headers = HashMap::new();
                match auth {
                    Some(HttpAuthConfig::Bearer { bearer }) => {
                        headers.insert("Authorization".to_string(), format!("Bearer {bearer}"));
                    },
                    Some(HttpAuthConfig::Header { header, value }) => {
                        headers.insert(header.clone(), value.clone());
                    },
                    None => {},
                }

                let stream_task = match streaming_path {
                    Some(path) => self.spawn_http_stream_task(base_url, path, &headers).await,
                    None => None,
                };

                Ok(Transport::Http {
                    port: self.http_port.clone(),
                    base_url: base_url.clone(),
                    headers,
                    stream_task: Mutex::new(stream_task),
                })
            },
            ServerDescriptorConfig::InProcess { .. } => Err(McpError::Transport {
                server: self.name.clone(),
                source: xkit_core::error::PortError::Http(
                    "in-process servers are wired directly by the caller, not through connect()"
                        .to_string(),
                ),
            }),
        }
    }

    /// Hand the spawned child process to a dedicated task that owns it
    /// exclusively, so a write for one call is never blocked behind another
    /// call's in-flight read.
    fn spawn_child_actor(&self, mut child: Box<dyn ChildProcess>) -> mpsc::UnboundedSender<String> {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let pending = self.pending.clone();
        let codec = self.line_codec.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    line = outbound_rx.recv() => {
                        match line {
                            Some(line) => {
                                if let Err(err) = child.write_line(&line).await {
                                    warn!(server = %name, %err, "write to child server failed");
                                    break;
                                }
                            },
                            None => break,
                        }
                    },
                    read = child.read_line() => {
                        match read {
                            Ok(Some(raw)) => dispatch_incoming_line(&name, &codec, &pending, &raw).await,
                            Ok(None) => {
                                debug!(server = %name, "child server closed its stdout");
                                break;
                            },
                            Err(err) => {
                                warn!(server = %name, %err, "read from child server failed");
                                break;
                            },
                        }
                    },
                }
            }
            let _ = child.kill().await;
        });

        outbound_tx
    }

    /// Open the HTTP transport's streaming (SSE-like) endpoint, if one is
    /// configured, and forward pushed messages into this connection.
    ///
    /// Best-effort: a failure to open the stream is logged and the
    /// connection proceeds without server-initiated push, since the
    /// request/response path still works without it.
    async fn spawn_http_stream_task(
        &self,
        base_url: &str,
        streaming_path: &str,
        headers: &HashMap<String, String>,
    ) -> Option<JoinHandle<()>> {
        let url = format!("{base_url}{streaming_path}");
        match self.http_port.stream_events(&url, headers.clone()).await {
            Ok(mut stream_rx) => {
                let weak = self.self_ref.clone();
                Some(tokio::spawn(async move {
                    while let Some(value) = stream_rx.recv().await {
                        let Some(connection) = weak.upgrade() else { break };
                        connection.handle_stream_event(value).await;
                    }
                }))
            },
            Err(err) => {
                warn!(
                    server = %self.name, %err,
                    "failed to open streaming endpoint; server-initiated notifications will not be delivered"
                );
                None
            },
        }
    }

    /// Route one event pushed over the HTTP streaming endpoint: a response
    /// resolves a pending call, a tool-list-changed notification triggers a
    /// tool refresh and a published `ToolsChanged`, anything else is logged
    /// and dropped.
    async fn handle_stream_event(&self, value: Value) {
        match HttpCodec.decode_body(&value.to_string()) {
            Ok(Message::Response(resp)) => {
                let id = expected_id(&resp.id);
                if let Some(tx) = self.pending.lock().await.remove(&id) {
                    let _ = tx.send(resp.outcome);
                }
            },
            Ok(Message::Notification(note)) => {
                if note.method.contains("tools") {
                    if self.refresh_tools(self.default_call_deadline).await.is_ok() {
                        self.publish_tools_changed().await;
                    }
                } else {
                    debug!(server = %self.name, method = %note.method, "ignoring server-pushed notification");
                }
            },
            Ok(Message::Request(_)) => {
                warn!(server = %self.name, "server pushed a request over the streaming channel, which is unsupported");
            },
            Err(err) => warn!(server = %self.name, %err, "malformed server-sent event"),
        }
    }

    async fn publish_tools_changed(&self) {
        let Some(events) = &self.events else { return };
        let Ok(event_type) = xkit_core::ids::EventTypeName::new(catalog::TOOLS_CHANGED) else {
            return;
        };
        let payload = serde_json::json!({ "server": self.name.as_str() });
        let _ = events.publish(event_type, payload, None).await;
    }

    async fn handshake(&self, deadline: Duration) -> McpResult<()> {
        let params = serde_json::json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": { "name": "xkit", "version": env!("CARGO_PKG_VERSION") },
        });
        self.request("initialize", Some(params), deadline)
            .await
            .map_err(|err| match err {
                McpError::CallTimeout { .. } => McpError::HandshakeTimeout(self.name.clone()),
                other => other,
            })?;
        self.notify("notifications/initialized", None).await?;
        Ok(())
    }

    async fn refresh_tools(&self, deadline: Duration) -> McpResult<()> {
        let result = self.request("tools/list", None, deadline).await?;
        let raw_tools = result.get("tools").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut tools = Vec::with_capacity(raw_tools.len());
        for raw in raw_tools {
            let Some(name) = raw.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Ok(tool_name) = ToolName::new(name) else {
                warn!(server = %self.name, tool = name, "server offered a tool with an invalid name");
                continue;
            };
            tools.push(ToolDefinition {
                name: tool_name,
                server: self.name.clone(),
                description: raw.get("description").and_then(Value::as_str).map(String::from),
                input_schema: raw.get("inputSchema").cloned().unwrap_or(Value::Null),
            });
        }

        *self.tools.write().await = tools;
        Ok(())
    }

    /// Call a tool by name, if it was discovered on this server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is not ready, the tool is unknown, the
    /// call times out, or the server reports a failure.
    pub async fn call_tool(&self, tool: &ToolName, arguments: Value, deadline: Duration) -> McpResult<ToolResult> {
        if self.state().await != ConnectionState::Ready {
            return Err(McpError::NotConnected(self.name.clone()));
        }
        if !self.tools.read().await.iter().any(|t| &t.name == tool) {
            return Err(McpError::UnknownTool {
                server: self.name.clone(),
                tool: tool.as_str().to_string(),
            });
        }

        let params = serde_json::json!({ "name": tool.as_str(), "arguments": arguments });
        let outcome = self.request("tools/call", Some(params), deadline).await?;

        let is_error = outcome.get("isError").and_then(Value::as_bool).unwrap_or(false);
        if is_error {
            let message = outcome
                .get("content")
                .map(|c| c.to_string())
                .unwrap_or_else(|| "tool call failed".to_string());
            Ok(ToolResult::failed(message))
        } else {
            Ok(ToolResult::ok(outcome.get("content").cloned().unwrap_or(Value::Null)))
        }
    }

    /// Send a request and await its response, registering a `pending` entry
    /// so the reply can arrive on whichever task observes it first.
    ///
    /// On timeout, the `pending` entry is removed before returning so it
    /// never leaks, and a best-effort `$/cancelRequest` notification is sent
    /// to the server.
    async fn request(&self, method: &str, params: Option<Value>, deadline: Duration) -> McpResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = RequestMessage::new(Value::from(id), method, params);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(err) = self.send_line(&Message::Request(message)).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(received) => received.map_err(|_| McpError::Transport {
                server: self.name.clone(),
                source: xkit_core::error::PortError::ProcessExited,
            })?,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                self.send_cancel(id).await;
                return Err(McpError::CallTimeout {
                    server: self.name.clone(),
                    tool: method.to_string(),
                });
            },
        };

        match outcome {
            ResponseOutcome::Result { result } => Ok(result),
            ResponseOutcome::Error { error } => Err(McpError::ToolCallFailed {
                server: self.name.clone(),
                tool: method.to_string(),
                message: error.message,
            }),
        }
    }

    /// Best-effort notice to the server that a timed-out call's result is no
    /// longer wanted. The server may ignore it or reply anyway; either way
    /// the local `pending` entry is already gone by the time this is sent.
    async fn send_cancel(&self, id: u64) {
        let params = serde_json::json!({ "id": id });
        if let Err(err) = self.notify("$/cancelRequest", Some(params)).await {
            debug!(server = %self.name, %err, "best-effort $/cancelRequest failed to send");
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let message = NotificationMessage::new(method, params);
        self.send_line(&Message::Notification(message)).await
    }

    async fn send_line(&self, message: &Message) -> McpResult<()> {
        let line = message.to_line();
        let transport = self.transport.read().await.clone().ok_or_else(|| McpError::NotConnected(self.name.clone()))?;
        match transport.as_ref() {
            Transport::ChildProcess { outbound } => outbound.send(line).map_err(|_| McpError::Transport {
                server: self.name.clone(),
                source: xkit_core::error::PortError::ProcessExited,
            }),
            Transport::Http { port, base_url, headers, .. } => {
                let request = HttpRequest {
                    url: base_url.clone(),
                    headers: headers.clone(),
                    body: Some(serde_json::from_str(&line).unwrap_or(Value::Null)),
                };
                let response = port.post_json(request).await.map_err(|source| McpError::Transport {
                    server: self.name.clone(),
                    source,
                })?;
                if let Message::Request(req) = message {
                    let id = expected_id(&req.id);
                    if !(200..300).contains(&response.status) {
                        if let Some(tx) = self.pending.lock().await.remove(&id) {
                            let _ = tx.send(ResponseOutcome::Error {
                                error: xkit_protocol::message::ErrorObject {
                                    code: -32000,
                                    message: format!("server responded with HTTP {}", response.status),
                                    data: None,
                                },
                            });
                        }
                        return Ok(());
                    }
                    let body = String::from_utf8_lossy(&response.body);
                    match HttpCodec.decode_body(&body) {
                        Ok(Message::Response(resp)) => {
                            if let Some(tx) = self.pending.lock().await.remove(&id) {
                                let _ = tx.send(resp.outcome);
                            }
                        },
                        Ok(_) => warn!(server = %self.name, "HTTP response body was not a JSON-RPC response"),
                        Err(err) => warn!(server = %self.name, %err, "malformed HTTP response body"),
                    }
                }
                Ok(())
            },
        }
    }

    /// Tear down the transport. Idempotent.
    ///
    /// Sends a best-effort `exit` notification before the transport is torn
    /// down; the child-process transport's reader/writer task terminates the
    /// process once the outbound channel drains and closes.
    pub async fn disconnect(&self) {
        *self.state.write().await = ConnectionState::Closing;
        let _ = self.notify("exit", None).await;
        if let Some(transport) = self.transport.write().await.take() {
            if let Transport::Http { stream_task, .. } = transport.as_ref() {
                if let Some(handle) = stream_task.lock().await.take() {
                    handle.abort();
                }
            }
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }
}

async fn dispatch_incoming_line(
    name: &ServerName,
    codec: &LineCodec,
    pending: &Mutex<HashMap<RequestId, oneshot::Sender<ResponseOutcome>>>,
    raw: &str,
) {
    match codec.decode_line(raw) {
        Ok(Message::Response(resp)) => {
            let id = expected_id(&resp.id);
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(resp.outcome);
            }
        },
        Ok(other) => {
            debug!(server = %name, ?other, "ignoring unmatched message while awaiting response");
        },
        Err(err) => {
            warn!(server = %name, %err, "malformed or oversize line from child server");
        },
    }
}

fn expected_id(value: &Value) -> RequestId {
    value.as_u64().unwrap_or_default()
}
