//! Ollama provider implementation
//!
//! This module implements the Provider trait for Ollama's native
//! `/api/chat` endpoint. Non-streaming replies are one JSON object;
//! streaming replies are newline-delimited JSON objects, the last of which
//! has `done: true`.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OllamaConfig;
use crate::error::{McpChatError, Result};
use crate::providers::{ChatOptions, Message, Provider, TextStream};

/// Ollama API provider
///
/// # Examples
///
/// ```no_run
/// use mcpchat::config::OllamaConfig;
/// use mcpchat::providers::{ChatOptions, Message, OllamaProvider, Provider};
///
/// # async fn example() -> anyhow::Result<()> {
/// let provider = OllamaProvider::new(OllamaConfig::default())?;
/// let reply = provider
///     .chat(&[Message::user("Hello!")], &ChatOptions::default())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
    timeout: Duration,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// One reply object, either the whole answer or one streamed line
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Errors
    ///
    /// Returns [`McpChatError::Http`] if the HTTP client cannot be built.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("mcpchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(McpChatError::Http)?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self {
            client,
            config,
            timeout,
        })
    }

    /// Get the configured Ollama host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));
        let request = OllamaRequest {
            model: &self.config.model,
            messages,
            stream,
            options: options
                .temperature
                .or(self.config.temperature)
                .map(|temperature| OllamaOptions { temperature }),
        };

        tracing::debug!(
            "Sending Ollama request: {} messages, stream={}",
            messages.len(),
            stream
        );

        let response = match tokio::time::timeout(
            self.timeout,
            self.client.post(&url).json(&request).send(),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!("Ollama request failed: {}", e);
                return Err(
                    McpChatError::ModelUnavailable(format!("Ollama request failed: {e}")).into(),
                );
            }
            Err(_) => {
                return Err(McpChatError::ModelUnavailable(format!(
                    "Ollama did not respond within {}s",
                    self.timeout.as_secs()
                ))
                .into())
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(McpChatError::ModelResponse(format!(
                "Ollama returned error {status}: {error_text}"
            ))
            .into());
        }

        Ok(response)
    }
}

fn decode_line(line: &[u8]) -> Result<OllamaResponse> {
    let parsed: OllamaResponse = serde_json::from_slice(line).map_err(|e| {
        McpChatError::ModelResponse(format!("Failed to parse Ollama response: {e}"))
    })?;
    if let Some(error) = parsed.error {
        return Err(McpChatError::ModelResponse(format!("Ollama error: {error}")).into());
    }
    Ok(parsed)
}

type Body = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct LineState {
    body: Body,
    buffer: Vec<u8>,
    finished: bool,
    idle: Duration,
}

impl LineState {
    /// Pop the next complete line, or the trailing partial line once the
    /// body is exhausted.
    fn next_line(&mut self, body_done: bool) -> Option<Vec<u8>> {
        if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            return Some(line);
        }
        if body_done && !self.buffer.is_empty() {
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }
}

/// Turn an NDJSON body into content fragments. Ends at `done: true`, at the
/// end of the body, or right after yielding an error. Waiting longer than
/// `idle` for the next chunk ends the stream with
/// [`McpChatError::ModelUnavailable`].
fn ndjson_fragments(body: Body, idle: Duration) -> TextStream {
    let state = LineState {
        body,
        buffer: Vec::new(),
        finished: false,
        idle,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        let mut body_done = false;
        loop {
            if let Some(line) = state.next_line(body_done) {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match decode_line(&line) {
                    Ok(reply) => {
                        state.finished = reply.done;
                        let text = reply.message.map(|m| m.content).unwrap_or_default();
                        if !text.is_empty() {
                            return Some((Ok(text), state));
                        }
                        if state.finished {
                            return None;
                        }
                        continue;
                    }
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }
            if body_done {
                return None;
            }
            let next = match tokio::time::timeout(state.idle, state.body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    state.finished = true;
                    let err = McpChatError::ModelUnavailable(format!(
                        "Ollama sent no data for {}s",
                        state.idle.as_secs()
                    ));
                    return Some((Err(err.into()), state));
                }
            };
            match next {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    let err = McpChatError::ModelUnavailable(format!(
                        "Ollama response stream interrupted: {e}"
                    ));
                    return Some((Err(err.into()), state));
                }
                None => body_done = true,
            }
        }
    }))
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<String> {
        let response = self.send(messages, options, false).await?;
        let body = match tokio::time::timeout(self.timeout, response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                return Err(McpChatError::ModelUnavailable(format!(
                    "failed to read Ollama response: {e}"
                ))
                .into())
            }
            Err(_) => {
                return Err(McpChatError::ModelUnavailable(
                    "timed out reading Ollama response".to_string(),
                )
                .into())
            }
        };

        let reply = decode_line(&body)?;
        let message = reply.message.ok_or_else(|| {
            McpChatError::ModelResponse("Ollama response has no message".to_string())
        })?;
        tracing::debug!("Ollama response: done={}, {} chars", reply.done, message.content.len());
        Ok(message.content)
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<TextStream> {
        let response = self.send(messages, options, true).await?;
        Ok(ndjson_fragments(
            Box::pin(response.bytes_stream()),
            self.timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::collect_stream;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OllamaProvider {
        OllamaProvider::new(OllamaConfig {
            host: server.uri(),
            model: "llama3.2:latest".to_string(),
            timeout_seconds: 5,
            temperature: None,
        })
        .unwrap()
    }

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new(OllamaConfig::default()).unwrap();
        assert_eq!(provider.host(), "http://localhost:11434");
        assert_eq!(provider.model(), "llama3.2:latest");
        assert_eq!(provider.name(), "ollama");
    }

    #[tokio::test]
    async fn test_chat_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({ "model": "llama3.2:latest", "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "Hi there" },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .chat(&[Message::user("Hello")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");
    }

    #[tokio::test]
    async fn test_error_field_is_model_response_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": "model 'nope' not found"
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .chat(&[Message::user("Hello")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpChatError>(),
            Some(McpChatError::ModelResponse(msg)) if msg.contains("not found")
        ));
    }

    #[tokio::test]
    async fn test_stream_concatenation_equals_chat() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"The sum\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\" is 102.\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/x-ndjson")
                    .set_body_string(ndjson),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "The sum is 102." },
                "done": true
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let messages = [Message::user("add")];
        let whole = provider
            .chat(&messages, &ChatOptions::default())
            .await
            .unwrap();
        let stream = provider
            .chat_stream(&messages, &ChatOptions::default())
            .await
            .unwrap();
        let joined = collect_stream(stream, |_| {}).await.unwrap();
        assert_eq!(joined, whole);
    }

    #[tokio::test]
    async fn test_temperature_sent_in_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "options": { "temperature": 0.5 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "content": "ok" },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        provider_for(&server)
            .chat(&[Message::user("Hello")], &ChatOptions::with_temperature(0.5))
            .await
            .unwrap();
    }

    #[test]
    fn test_line_state_splits_and_flushes() {
        let mut state = LineState {
            body: Box::pin(futures::stream::empty()),
            buffer: b"{\"a\":1}\n{\"b\"".to_vec(),
            finished: false,
            idle: Duration::from_secs(1),
        };
        assert_eq!(state.next_line(false).unwrap(), b"{\"a\":1}".to_vec());
        assert!(state.next_line(false).is_none());
        assert_eq!(state.next_line(true).unwrap(), b"{\"b\"".to_vec());
    }

    #[tokio::test]
    async fn test_stalled_stream_is_model_unavailable() {
        let host = crate::providers::stalled_body_server(
            "application/x-ndjson",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"The sum\"},\"done\":false}\n",
        )
        .await;
        let provider = OllamaProvider::new(OllamaConfig {
            host,
            model: "llama3.2:latest".to_string(),
            timeout_seconds: 1,
            temperature: None,
        })
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), async {
            let stream = provider
                .chat_stream(&[Message::user("add")], &ChatOptions::default())
                .await
                .unwrap();
            let mut fragments = Vec::new();
            let result = collect_stream(stream, |f| fragments.push(f.to_string())).await;
            (fragments, result)
        })
        .await
        .expect("stream stalled past its idle bound");

        let (fragments, result) = result;
        assert_eq!(fragments, vec!["The sum"]);
        assert!(matches!(
            result.unwrap_err().downcast_ref::<McpChatError>(),
            Some(McpChatError::ModelUnavailable(_))
        ));
    }
}
