//! In-process fake transport and scripted MCP server for tests
//!
//! [`FakeTransport::new`] returns a transport plus a [`FakeTransportHandle`]
//! for the test side:
//!
//! ```text
//! client send() -----> outbound channel -----> handle.outbound_rx
//! handle.inbound_tx -> inbound channel  -----> client receive()
//! ```
//!
//! [`FakeServer`] consumes a handle and answers JSON-RPC requests the way a
//! small MCP server would, recording every request it saw.
//!
//! # Example
//!
//! ```
//! use mcpchat::mcp::transport::fake::FakeTransport;
//! use mcpchat::mcp::transport::Transport;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (transport, mut handle) = FakeTransport::new();
//! transport.open().await.unwrap();
//! transport.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string()).await.unwrap();
//! let sent = handle.outbound_rx.recv().await.unwrap();
//! assert!(sent.contains("ping"));
//! # }
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{McpChatError, Result};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    JsonRpcRequest, PromptDescriptor, ResourceDescriptor, ResourceTemplate, ToolDescriptor,
    LATEST_PROTOCOL_VERSION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBehavior {
    Succeed,
    Refuse,
    Hang,
}

/// In-memory transport. See the module docs for the channel wiring.
#[derive(Debug)]
pub struct FakeTransport {
    open_behavior: OpenBehavior,
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    disconnected: CancellationToken,
    close_count: Arc<AtomicUsize>,
}

impl FakeTransport {
    /// A transport whose `open` succeeds immediately.
    pub fn new() -> (Self, FakeTransportHandle) {
        Self::with_behavior(OpenBehavior::Succeed)
    }

    /// A transport whose `open` fails like a refused connection.
    pub fn unreachable() -> (Self, FakeTransportHandle) {
        Self::with_behavior(OpenBehavior::Refuse)
    }

    /// A transport whose `open` never completes.
    pub fn hanging() -> (Self, FakeTransportHandle) {
        Self::with_behavior(OpenBehavior::Hang)
    }

    fn with_behavior(open_behavior: OpenBehavior) -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let disconnected = CancellationToken::new();
        let close_count = Arc::new(AtomicUsize::new(0));

        let transport = Self {
            open_behavior,
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            disconnected: disconnected.clone(),
            close_count: Arc::clone(&close_count),
        };
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
            disconnected,
            close_count,
        };
        (transport, handle)
    }
}

/// Test-side end of a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Messages the client sent.
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Messages pushed here are delivered to the client.
    pub inbound_tx: mpsc::UnboundedSender<String>,
    disconnected: CancellationToken,
    close_count: Arc<AtomicUsize>,
}

impl FakeTransportHandle {
    /// Next outbound message, or `None` if nothing arrives within `wait`.
    pub async fn next_outbound(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.outbound_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Push a JSON value to the client.
    pub fn send_inbound(&self, message: Value) -> Result<()> {
        self.inbound_tx
            .send(message.to_string())
            .map_err(|_| McpChatError::Transport("fake client stopped receiving".into()))?;
        Ok(())
    }

    /// Simulate the peer dropping the connection: the inbound stream ends
    /// and further sends fail.
    pub fn disconnect(&self) {
        self.disconnected.cancel();
    }

    /// A clone-able switch for [`disconnect`](Self::disconnect), usable
    /// after the handle has been moved into a server task.
    pub fn disconnect_switch(&self) -> CancellationToken {
        self.disconnected.clone()
    }

    /// How many times the transport was closed.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Shared close counter, usable after the handle has been moved.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_count)
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn open(&self) -> Result<()> {
        match self.open_behavior {
            OpenBehavior::Succeed => Ok(()),
            OpenBehavior::Refuse => {
                Err(McpChatError::Connection("connection refused (fake)".into()).into())
            }
            OpenBehavior::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn send(&self, message: String) -> Result<()> {
        if self.disconnected.is_cancelled() {
            return Err(McpChatError::Transport("fake peer disconnected".into()).into());
        }
        self.outbound_tx
            .send(message)
            .map_err(|_| McpChatError::Transport("fake peer dropped".into()))?;
        Ok(())
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let state = (Arc::clone(&self.inbound_rx), self.disconnected.clone());
        Box::pin(futures::stream::unfold(state, |(rx, disconnected)| async move {
            let item = {
                let mut guard = rx.lock().await;
                tokio::select! {
                    _ = disconnected.cancelled() => None,
                    item = guard.recv() => item,
                }
            }?;
            Some((item, (rx, disconnected)))
        }))
    }

    async fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted server
// ---------------------------------------------------------------------------

/// What the fake server does with one request.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Answer with this `result`.
    Result(Value),
    /// Answer with a JSON-RPC error object.
    Error { code: i64, message: String },
    /// Drop the connection without answering.
    Disconnect,
    /// Never answer.
    Silent,
}

impl FakeReply {
    /// A successful `tools/call` result with one text item.
    pub fn text(text: impl Into<String>) -> Self {
        FakeReply::Result(json!({ "content": [{ "type": "text", "text": text.into() }] }))
    }

    /// A `tools/call` result flagged `isError`.
    pub fn tool_error(text: impl Into<String>) -> Self {
        FakeReply::Result(json!({
            "content": [{ "type": "text", "text": text.into() }],
            "isError": true
        }))
    }
}

type CallHandler = Box<dyn Fn(&str, &Value) -> FakeReply + Send + Sync>;

/// A minimal MCP server speaking over a [`FakeTransportHandle`].
pub struct FakeServer {
    tools: Vec<ToolDescriptor>,
    resources: Vec<ResourceDescriptor>,
    templates: Vec<ResourceTemplate>,
    prompts: Vec<PromptDescriptor>,
    resource_texts: HashMap<String, String>,
    initialize_reply: Option<FakeReply>,
    page_size: usize,
    on_call: CallHandler,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            resources: Vec::new(),
            templates: Vec::new(),
            prompts: Vec::new(),
            resource_texts: HashMap::new(),
            initialize_reply: None,
            page_size: usize::MAX,
            on_call: Box::new(|name, _| FakeReply::Error {
                code: -32602,
                message: format!("Unknown tool: {name}"),
            }),
        }
    }

    /// Advertise a tool with the given JSON input schema.
    pub fn tool(mut self, name: &str, description: &str, input_schema: Value) -> Self {
        self.tools.push(ToolDescriptor {
            name: name.to_string(),
            title: None,
            description: Some(description.to_string()),
            input_schema,
        });
        self
    }

    /// Advertise a readable text resource.
    pub fn resource(mut self, uri: &str, name: &str, text: &str) -> Self {
        self.resources.push(ResourceDescriptor {
            uri: uri.to_string(),
            name: name.to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
        });
        self.resource_texts.insert(uri.to_string(), text.to_string());
        self
    }

    pub fn template(mut self, uri_template: &str, name: &str) -> Self {
        self.templates.push(ResourceTemplate {
            uri_template: uri_template.to_string(),
            name: name.to_string(),
            description: None,
            mime_type: None,
        });
        self
    }

    pub fn prompt(mut self, name: &str, description: &str) -> Self {
        self.prompts.push(PromptDescriptor {
            name: name.to_string(),
            description: Some(description.to_string()),
            arguments: Vec::new(),
        });
        self
    }

    /// Split every listing into pages of `size` items.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Override the reply to `initialize`.
    pub fn initialize_with(mut self, reply: FakeReply) -> Self {
        self.initialize_reply = Some(reply);
        self
    }

    /// Decide how each `tools/call` is answered.
    pub fn on_call(
        mut self,
        handler: impl Fn(&str, &Value) -> FakeReply + Send + Sync + 'static,
    ) -> Self {
        self.on_call = Box::new(handler);
        self
    }

    /// Serve requests arriving on `handle` until the client goes away.
    pub fn spawn(self, handle: FakeTransportHandle) -> FakeServerLog {
        let log = FakeServerLog {
            requests: Arc::new(std::sync::Mutex::new(Vec::new())),
            close_count: handle.close_counter(),
        };
        let requests = Arc::clone(&log.requests);

        tokio::spawn(async move {
            let mut handle = handle;
            while let Some(raw) = handle.outbound_rx.recv().await {
                let Ok(request) = serde_json::from_str::<JsonRpcRequest>(&raw) else {
                    continue;
                };
                if let Ok(mut requests) = requests.lock() {
                    requests.push(request.clone());
                }
                let Some(id) = request.id.clone() else {
                    continue;
                };

                let params = request.params.clone().unwrap_or(Value::Null);
                let reply = self.reply_to(&request.method, &params);
                let message = match reply {
                    FakeReply::Result(result) => {
                        json!({ "jsonrpc": "2.0", "id": id, "result": result })
                    }
                    FakeReply::Error { code, message } => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": code, "message": message }
                    }),
                    FakeReply::Disconnect => {
                        handle.disconnect();
                        break;
                    }
                    FakeReply::Silent => continue,
                };
                if handle.send_inbound(message).is_err() {
                    break;
                }
            }
        });

        log
    }

    fn reply_to(&self, method: &str, params: &Value) -> FakeReply {
        let cursor = params.get("cursor").and_then(Value::as_str);
        match method {
            "initialize" => self.initialize_reply.clone().unwrap_or_else(|| {
                FakeReply::Result(json!({
                    "protocolVersion": LATEST_PROTOCOL_VERSION,
                    "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
                    "serverInfo": { "name": "fake", "version": "0.0.0" }
                }))
            }),
            "ping" => FakeReply::Result(json!({})),
            "tools/list" => self.page("tools", &self.tools, cursor),
            "resources/list" => self.page("resources", &self.resources, cursor),
            "resources/templates/list" => self.page("resourceTemplates", &self.templates, cursor),
            "prompts/list" => self.page("prompts", &self.prompts, cursor),
            "tools/call" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                (self.on_call)(name, &args)
            }
            "resources/read" => {
                let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
                match self.resource_texts.get(uri) {
                    Some(text) => FakeReply::Result(json!({
                        "contents": [{ "uri": uri, "mimeType": "text/plain", "text": text }]
                    })),
                    None => FakeReply::Error {
                        code: -32002,
                        message: format!("Resource not found: {uri}"),
                    },
                }
            }
            "prompts/get" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                FakeReply::Result(json!({
                    "messages": [{
                        "role": "user",
                        "content": { "type": "text", "text": format!("prompt {name}") }
                    }]
                }))
            }
            other => FakeReply::Error {
                code: -32601,
                message: format!("Method not found: {other}"),
            },
        }
    }

    fn page<T: Serialize>(&self, key: &str, items: &[T], cursor: Option<&str>) -> FakeReply {
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = start.saturating_add(self.page_size).min(items.len());
        let slice = items.get(start..end).unwrap_or_default();
        let mut result = serde_json::Map::new();
        result.insert(key.to_string(), json!(slice));
        if end < items.len() {
            result.insert("nextCursor".to_string(), Value::String(end.to_string()));
        }
        FakeReply::Result(Value::Object(result))
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Record of what a [`FakeServer`] received.
#[derive(Debug, Clone)]
pub struct FakeServerLog {
    requests: Arc<std::sync::Mutex<Vec<JsonRpcRequest>>>,
    close_count: Arc<AtomicUsize>,
}

impl FakeServerLog {
    /// Methods of every request and notification, in arrival order.
    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.iter().map(|r| r.method.clone()).collect())
            .unwrap_or_default()
    }

    /// `(name, arguments)` of every `tools/call` received.
    pub fn tool_calls(&self) -> Vec<(String, Value)> {
        self.requests
            .lock()
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.method == "tools/call")
                    .filter_map(|r| r.params.as_ref())
                    .map(|p| {
                        (
                            p["name"].as_str().unwrap_or_default().to_string(),
                            p.get("arguments").cloned().unwrap_or(Value::Null),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}
