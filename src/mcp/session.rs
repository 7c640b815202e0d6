//! Lifecycle-managed MCP client session
//!
//! [`McpSession`] owns one [`TransportSession`] and gates every remote
//! operation on its own lifecycle:
//!
//! ```text
//! Uninitialized --initialize()--> Initializing --ok--> Ready --cleanup()--> Closed
//!                                      |
//!                                      +--err--> Closed (connection released)
//! ```
//!
//! Discovery and invocation outside `Ready` fail with
//! [`McpChatError::SessionNotReady`]. Errors from the JSON-RPC layer are
//! classified here into the kinds callers act on: connection and protocol
//! failures during setup, tool-not-found and tool-execution failures during
//! invocation, and transport failures when the connection drops mid-call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{McpChatError, Result};
use crate::mcp::config::ServerConfig;
use crate::mcp::protocol::McpProtocol;
use crate::mcp::transport::{transport_for, Transport, TransportSession};
use crate::mcp::types::{
    CallToolResult, GetPromptResult, Implementation, InitializeResult, PromptDescriptor,
    ReadResourceResult, ResourceDescriptor, ResourceTemplate, ToolDescriptor,
    ERROR_METHOD_NOT_FOUND,
};

/// Name announced to servers in `clientInfo`.
pub const CLIENT_NAME: &str = "mcpchat";

/// Lifecycle of an [`McpSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A stateful connection to one MCP server.
///
/// # Examples
///
/// ```no_run
/// use mcpchat::mcp::config::ServerConfig;
/// use mcpchat::mcp::session::McpSession;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let mut session = McpSession::from_config(&ServerConfig::default())?;
/// session.initialize().await?;
/// let tools = session.list_tools().await?;
/// println!("{} tools", tools.len());
/// session.cleanup().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct McpSession {
    name: String,
    transport: TransportSession,
    protocol: Option<McpProtocol>,
    state: SessionState,
    connect_timeout: Duration,
    request_timeout: Duration,
    server_info: Option<InitializeResult>,
    /// Result of the last successful `list_tools`.
    tools: Vec<ToolDescriptor>,
}

impl McpSession {
    /// Wrap an unopened transport. Nothing touches the network until
    /// [`McpSession::initialize`].
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            transport: TransportSession::new(transport),
            protocol: None,
            state: SessionState::Uninitialized,
            connect_timeout,
            request_timeout,
            server_info: None,
            tools: Vec::new(),
        }
    }

    /// Build a session for a configured server.
    ///
    /// # Errors
    ///
    /// Returns [`McpChatError::Config`] if the server URL cannot be parsed,
    /// or an HTTP client construction error.
    pub fn from_config(server: &ServerConfig) -> Result<Self> {
        let transport = transport_for(server)?;
        Ok(Self::new(
            server.name.clone(),
            transport,
            Duration::from_secs(server.connect_timeout_seconds),
            Duration::from_secs(server.request_timeout_seconds),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handshake reply, once initialized.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Look up a tool among the last listing.
    pub fn find_tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Connect and run the protocol handshake.
    ///
    /// On any failure the connection is released and the session is left
    /// `Closed`; a new session must be built to retry.
    ///
    /// # Errors
    ///
    /// - [`McpChatError::Connection`] if the server cannot be reached, the
    ///   connection drops, or the handshake does not complete in time
    /// - [`McpChatError::Protocol`] if the handshake reply is malformed,
    ///   rejected, or names an unsupported protocol revision
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(McpChatError::Protocol(format!(
                "session '{}' cannot be initialized while {}",
                self.name, self.state
            ))
            .into());
        }

        tracing::info!(server = %self.name, "Initializing MCP session");
        self.state = SessionState::Initializing;

        match self.connect_and_handshake().await {
            Ok(()) => {
                self.state = SessionState::Ready;
                if let Some(info) = &self.server_info {
                    tracing::info!(
                        server = %self.name,
                        remote = %info.server_info.name,
                        protocol = %info.protocol_version,
                        "MCP session ready"
                    );
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(server = %self.name, "MCP session initialization failed: {e:#}");
                self.cleanup().await;
                Err(e)
            }
        }
    }

    async fn connect_and_handshake(&mut self) -> Result<()> {
        let client = self.transport.connect(self.connect_timeout).await?;
        let protocol = McpProtocol::new(client, self.request_timeout);

        let reply = match tokio::time::timeout(
            self.connect_timeout,
            protocol.handshake(Implementation::this_client(CLIENT_NAME)),
        )
        .await
        {
            Ok(reply) => reply.map_err(|e| classify_handshake_error(&self.name, e))?,
            Err(_) => {
                return Err(McpChatError::Connection(format!(
                    "server '{}' did not complete the handshake within {}s",
                    self.name,
                    self.connect_timeout.as_secs_f64()
                ))
                .into())
            }
        };

        self.server_info = Some(reply);
        self.protocol = Some(protocol);
        Ok(())
    }

    fn ready_protocol(&self) -> Result<&McpProtocol> {
        match (&self.protocol, self.state) {
            (Some(protocol), SessionState::Ready) => Ok(protocol),
            _ => Err(McpChatError::SessionNotReady {
                server: self.name.clone(),
                state: self.state.to_string(),
            }
            .into()),
        }
    }

    /// List every tool the server exposes, in server order, and remember
    /// the result for [`McpSession::find_tool`]. A failed listing forgets
    /// the previous one.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.tools.clear();
        let tools = self
            .ready_protocol()?
            .list_tools()
            .await
            .map_err(|e| classify_discovery_error("tools/list", e))?;
        tracing::debug!(server = %self.name, count = tools.len(), "Listed tools");
        self.tools = tools.clone();
        Ok(tools)
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ready_protocol()?
            .list_resources()
            .await
            .map_err(|e| classify_discovery_error("resources/list", e))
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        self.ready_protocol()?
            .list_resource_templates()
            .await
            .map_err(|e| classify_discovery_error("resources/templates/list", e))
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        self.ready_protocol()?
            .list_prompts()
            .await
            .map_err(|e| classify_discovery_error("prompts/list", e))
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.ready_protocol()?
            .read_resource(uri)
            .await
            .map_err(|e| classify_discovery_error("resources/read", e))
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        self.ready_protocol()?
            .get_prompt(name, arguments)
            .await
            .map_err(|e| classify_discovery_error("prompts/get", e))
    }

    /// Round-trip a `ping`.
    pub async fn ping(&self) -> Result<()> {
        self.ready_protocol()?.ping().await
    }

    /// Invoke a tool and wait for its result. Never retried.
    ///
    /// # Errors
    ///
    /// - [`McpChatError::InvalidToolCall`] for an empty name or non-object
    ///   arguments (nothing is sent)
    /// - [`McpChatError::ToolNotFound`] if the server does not know the tool
    /// - [`McpChatError::ToolExecution`] if the tool ran and reported
    ///   failure; the server's message is kept verbatim
    /// - [`McpChatError::Transport`] if the connection drops or the call
    ///   times out
    pub async fn execute_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let protocol = self.ready_protocol()?;

        if name.trim().is_empty() {
            return Err(McpChatError::InvalidToolCall("tool name cannot be empty".into()).into());
        }
        if !arguments.is_object() {
            return Err(McpChatError::InvalidToolCall(format!(
                "arguments for '{name}' must be an object, got {}",
                json_kind(&arguments)
            ))
            .into());
        }

        tracing::info!(server = %self.name, tool = name, "Calling tool");
        tracing::debug!(tool = name, arguments = %arguments, "Tool arguments");

        let result = match protocol.call_tool(name, arguments).await {
            Ok(result) => result,
            Err(e) => return Err(classify_call_error(name, e)),
        };

        if result.is_error {
            let message = result.text();
            if message.trim_start().starts_with(UNKNOWN_TOOL_PREFIX) {
                return Err(McpChatError::ToolNotFound(name.to_string()).into());
            }
            return Err(McpChatError::ToolExecution {
                tool: name.to_string(),
                message,
            }
            .into());
        }

        tracing::debug!(tool = name, "Tool call succeeded");
        Ok(result)
    }

    /// Close the connection. Safe to call in any state and more than once;
    /// only the first call releases anything. Close errors are logged.
    pub async fn cleanup(&mut self) {
        if self.state != SessionState::Closed {
            tracing::debug!(server = %self.name, state = %self.state, "Cleaning up MCP session");
        }
        self.protocol = None;
        self.state = SessionState::Closed;
        if let Err(e) = self.transport.close().await {
            tracing::warn!(server = %self.name, "error closing MCP transport: {e:#}");
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// How servers word an `isError` result for a tool they do not have.
const UNKNOWN_TOOL_PREFIX: &str = "Unknown tool:";

fn mentions_unknown_tool(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("unknown tool") || (lower.contains("tool") && lower.contains("not found"))
}

/// Setup failures: anything that stops the handshake from completing is a
/// connection problem unless the server answered with something unusable.
fn classify_handshake_error(server: &str, err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<McpChatError>() {
        Ok(McpChatError::Transport(msg)) => {
            McpChatError::Connection(format!("handshake with '{server}' failed: {msg}")).into()
        }
        Ok(McpChatError::Remote(e)) => {
            McpChatError::Protocol(format!("server '{server}' rejected initialize: {e}")).into()
        }
        Ok(other) => other.into(),
        Err(other) => other,
    }
}

fn classify_discovery_error(method: &str, err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<McpChatError>() {
        Ok(McpChatError::Remote(e)) => {
            McpChatError::Protocol(format!("'{method}' failed: {e}")).into()
        }
        Ok(other) => other.into(),
        Err(other) => other,
    }
}

fn classify_call_error(tool: &str, err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<McpChatError>() {
        Ok(McpChatError::Remote(e)) => {
            if e.code == ERROR_METHOD_NOT_FOUND || mentions_unknown_tool(&e.message) {
                McpChatError::ToolNotFound(tool.to_string()).into()
            } else {
                McpChatError::ToolExecution {
                    tool: tool.to_string(),
                    message: e.message,
                }
                .into()
            }
        }
        Ok(other) => other.into(),
        Err(other) => other,
    }
}
