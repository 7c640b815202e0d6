//! OpenAI-compatible chat completions provider
//!
//! Talks to any server exposing `POST {base_url}/chat/completions` in the
//! OpenAI format: LM Studio, llama.cpp server, vLLM, or OpenAI itself.
//! Streaming responses are server-sent events whose `data` is either a
//! completion chunk or the `[DONE]` sentinel.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::{McpChatError, Result};
use crate::providers::{ChatOptions, Message, Provider, TextStream};
use crate::sse::{sse_events, EventStream};

/// OpenAI-compatible provider
///
/// # Examples
///
/// ```no_run
/// use mcpchat::config::OpenAiConfig;
/// use mcpchat::providers::{ChatOptions, Message, OpenAiProvider, Provider};
///
/// # async fn example() -> anyhow::Result<()> {
/// let provider = OpenAiProvider::new(OpenAiConfig::default())?;
/// let reply = provider
///     .chat(&[Message::user("Hello!")], &ChatOptions::default())
///     .await?;
/// println!("{reply}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider. No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`McpChatError::Http`] if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("mcpchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(McpChatError::Http)?;

        tracing::info!(
            "Initialized OpenAI-compatible provider: base_url={}, model={}",
            config.base_url,
            config.model
        );

        Ok(Self {
            client,
            config,
            timeout,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: self.config.max_tokens,
            stream,
        };

        tracing::debug!(
            "Sending chat completion request: {} messages, stream={}",
            messages.len(),
            stream
        );

        let mut builder = self.client.post(self.completions_url()).json(&request);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!("Chat completion request failed: {}", e);
                return Err(McpChatError::ModelUnavailable(format!(
                    "request to {} failed: {}",
                    self.config.base_url, e
                ))
                .into());
            }
            Err(_) => {
                return Err(McpChatError::ModelUnavailable(format!(
                    "no response from {} within {}s",
                    self.config.base_url,
                    self.timeout.as_secs()
                ))
                .into())
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Inference backend returned error {}: {}", status, error_text);
            return Err(McpChatError::ModelResponse(format!(
                "backend returned {status}: {error_text}"
            ))
            .into());
        }

        Ok(response)
    }
}

/// Decode one streamed chunk into its text delta, if it carries any.
fn decode_chunk(data: &str) -> Result<Option<String>> {
    if data.is_empty() {
        return Ok(None);
    }
    let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| {
        McpChatError::ModelResponse(format!("failed to decode stream chunk '{data}': {e}"))
    })?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

/// Turn completion events into text fragments. Ends at `[DONE]`, at the end
/// of the body, or right after yielding an error. Waiting longer than `idle`
/// for the next event ends the stream with [`McpChatError::ModelUnavailable`].
fn completion_fragments(events: EventStream, idle: Duration) -> TextStream {
    Box::pin(futures::stream::unfold(Some(events), move |state| async move {
        let mut events = state?;
        loop {
            let next = match tokio::time::timeout(idle, events.next()).await {
                Ok(next) => next?,
                Err(_) => {
                    let err = McpChatError::ModelUnavailable(format!(
                        "no stream data for {}s",
                        idle.as_secs()
                    ));
                    return Some((Err(err.into()), None));
                }
            };
            match next {
                Ok(event) => {
                    let data = event.data.trim();
                    if data == "[DONE]" {
                        return None;
                    }
                    match decode_chunk(data) {
                        Ok(Some(text)) => return Some((Ok(text), Some(events))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), None)),
                    }
                }
                Err(e) => {
                    let err = McpChatError::ModelUnavailable(format!(
                        "response stream interrupted: {e:#}"
                    ));
                    return Some((Err(err.into()), None));
                }
            }
        }
    }))
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<String> {
        let response = self.send(messages, options, false).await?;

        let body = match tokio::time::timeout(self.timeout, response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                return Err(McpChatError::ModelUnavailable(format!(
                    "failed to read response body: {e}"
                ))
                .into())
            }
            Err(_) => {
                return Err(McpChatError::ModelUnavailable(
                    "timed out reading response body".to_string(),
                )
                .into())
            }
        };

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse chat completion: {}", e);
            McpChatError::ModelResponse(format!("failed to parse chat completion: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| McpChatError::ModelResponse("response has no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        tracing::debug!("Chat completion received: {} chars", content.len());
        Ok(content)
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<TextStream> {
        let response = self.send(messages, options, true).await?;
        Ok(completion_fragments(
            sse_events(response.bytes_stream()),
            self.timeout,
        ))
    }
}
