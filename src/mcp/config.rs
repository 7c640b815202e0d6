//! MCP server connection settings
//!
//! One [`ServerConfig`] per entry under `servers:` in the configuration
//! file. The top-level [`crate::config::Config`] owns the list and runs
//! [`ServerConfig::validate`] on each entry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{McpChatError, Result};

/// Wire protocol used to reach an MCP server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Legacy HTTP+SSE (`GET /sse` plus a POST endpoint).
    #[default]
    Sse,
    /// Streamable HTTP (single POST endpoint).
    Http,
}

/// Connection settings for one MCP server.
///
/// # Examples
///
/// ```
/// use mcpchat::mcp::config::{ServerConfig, TransportKind};
///
/// let server = ServerConfig::default();
/// assert_eq!(server.name, "Demo");
/// assert_eq!(server.transport, TransportKind::Sse);
/// assert!(server.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Name used in logs and for routing tool calls.
    pub name: String,

    /// Endpoint URL. For `sse` this is the event stream URL.
    pub url: String,

    #[serde(default)]
    pub transport: TransportKind,

    /// Upper bound on connecting and completing the handshake.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Upper bound on each request after the handshake.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Extra HTTP headers sent with every request (e.g. authorization).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Demo".to_string(),
            url: "http://localhost:8000/sse".to_string(),
            transport: TransportKind::Sse,
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
            headers: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Check this entry in isolation. Duplicate names are checked by the
    /// caller that owns the whole list.
    ///
    /// # Errors
    ///
    /// Returns [`McpChatError::Config`] for an empty name, a URL that is
    /// not absolute `http`/`https`, or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(McpChatError::Config("server name cannot be empty".to_string()).into());
        }

        let url = url::Url::parse(&self.url).map_err(|e| {
            McpChatError::Config(format!(
                "server '{}' has invalid url '{}': {}",
                self.name, self.url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(McpChatError::Config(format!(
                "server '{}' url must use http or https, got '{}'",
                self.name,
                url.scheme()
            ))
            .into());
        }

        if self.connect_timeout_seconds == 0 {
            return Err(McpChatError::Config(format!(
                "server '{}': connect_timeout_seconds must be greater than 0",
                self.name
            ))
            .into());
        }

        if self.request_timeout_seconds == 0 {
            return Err(McpChatError::Config(format!(
                "server '{}': request_timeout_seconds must be greater than 0",
                self.name
            ))
            .into());
        }

        Ok(())
    }
}
