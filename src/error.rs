//! Error types for mcpchat
//!
//! One `thiserror` enum covers every failure kind the library reports.
//! Functions return [`Result`], an `anyhow` alias, and callers that need to
//! branch on the kind use `downcast_ref::<McpChatError>()`.

use thiserror::Error;

use crate::mcp::types::JsonRpcError;

/// Main error type for mcpchat operations
#[derive(Error, Debug)]
pub enum McpChatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transport could not be opened, or the initialize handshake did
    /// not complete
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server violated the protocol (bad handshake reply, unsupported
    /// version, undecodable result)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A call was made on a session that is not in the Ready state
    #[error("Session '{server}' is not ready (state: {state})")]
    SessionNotReady {
        /// Server name of the session
        server: String,
        /// Current session state
        state: String,
    },

    /// The named tool is not offered by the server
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The server ran the tool and reported a failure; `message` is the
    /// server payload as received
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Tool name
        tool: String,
        /// Failure payload from the server
        message: String,
    },

    /// The connection failed or timed out during a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// Arguments passed to `execute_tool` were rejected before sending
    #[error("Invalid tool call: {0}")]
    InvalidToolCall(String),

    /// A JSON-RPC error object returned by the server, before it has been
    /// classified into one of the kinds above
    #[error("Remote error: {0}")]
    Remote(JsonRpcError),

    /// The inference backend could not be reached or timed out
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// The inference backend answered with something unusable
    #[error("Model response error: {0}")]
    ModelResponse(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl McpChatError {
    /// Returns true for the kinds a caller can expect to change on retry
    /// (connection loss, timeouts, unreachable backend)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            McpChatError::Connection(_)
                | McpChatError::Transport(_)
                | McpChatError::ModelUnavailable(_)
        )
    }
}

/// Result type alias for mcpchat operations
///
/// Uses `anyhow::Error` so context can be attached while the underlying
/// [`McpChatError`] stays recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
