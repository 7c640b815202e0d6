//! Base provider trait and common types
//!
//! This module defines the [`Provider`] trait every inference backend
//! implements, along with the [`Message`] shape sent to it. Providers are
//! stateless across calls: each `chat` or `chat_stream` carries the full
//! ordered history.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message structure for conversation
///
/// Represents one `{role, content}` entry of the history sent to the
/// inference backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpchat::providers::Message;
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpchat::providers::Message;
    ///
    /// let msg = Message::assistant("Hello, user!");
    /// assert_eq!(msg.role, "assistant");
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new system message
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpchat::providers::Message;
    ///
    /// let msg = Message::system("You are a helpful assistant");
    /// assert_eq!(msg.role, "system");
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call overrides of the provider's configured sampling settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChatOptions {
    /// Sampling temperature for this call only.
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
        }
    }
}

/// Lazy, finite, single-consumption sequence of response fragments.
///
/// Dropping the stream stops local consumption; it does not cancel
/// generation on the backend.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Inference backend
///
/// Implementations are stateless request/response bridges. Joining every
/// fragment of `chat_stream(messages)` yields the same text `chat(messages)`
/// would for a deterministic backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name used in logs ("openai", "ollama").
    fn name(&self) -> &str;

    /// Model identifier requests are sent with.
    fn model(&self) -> &str;

    /// Send the full history and return the complete response text.
    ///
    /// # Errors
    ///
    /// - [`crate::error::McpChatError::ModelUnavailable`] if the backend
    ///   cannot be reached or does not answer in time
    /// - [`crate::error::McpChatError::ModelResponse`] if it answers with
    ///   an error status or a body that cannot be decoded
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<String>;

    /// Send the full history and return the response as fragments.
    ///
    /// Connection and status errors are returned before any fragment is
    /// produced. Decode errors and waits past the provider timeout for the
    /// next fragment are yielded in-stream and end it.
    async fn chat_stream(&self, messages: &[Message], options: &ChatOptions)
        -> Result<TextStream>;
}

/// Drain a fragment stream, forwarding each fragment to `on_fragment`, and
/// return the joined text.
pub async fn collect_stream(
    mut stream: TextStream,
    mut on_fragment: impl FnMut(&str),
) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        on_fragment(&fragment);
        text.push_str(&fragment);
    }
    Ok(text)
}
