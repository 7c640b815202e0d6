//! Streamable HTTP transport
//!
//! Every outbound JSON-RPC message is an HTTP POST to a single endpoint.
//! The server replies with one of:
//!
//! - `application/json` -- the reply body is one JSON-RPC message
//! - `text/event-stream` -- an event stream carrying one or more messages
//! - `202 Accepted` -- no body (notifications and responses)
//!
//! A session id returned in the `Mcp-Session-Id` header is attached to
//! every later request, and `close` ends the session with a `DELETE`.
//! There is no connection to open up front: the first POST (the
//! `initialize` request) is where an unreachable server shows up.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use url::Url;

use crate::error::{McpChatError, Result};
use crate::mcp::transport::Transport;
use crate::mcp::types::LATEST_PROTOCOL_VERSION;
use crate::sse::sse_events;

const SESSION_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";

/// Streamable HTTP transport.
#[derive(Debug)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: Url,
    headers: HashMap<String, String>,
    session_id: Arc<RwLock<Option<String>>>,
    response_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
    response_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl HttpTransport {
    /// Build the transport. `timeout` applies to each POST, including
    /// reading an event-stream reply to the end.
    pub fn new(endpoint: Url, headers: HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mcpchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(McpChatError::Http)?;
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        Ok(Self {
            http_client,
            endpoint,
            headers,
            session_id: Arc::new(RwLock::new(None)),
            response_tx: std::sync::Mutex::new(Some(response_tx)),
            response_rx: Arc::new(Mutex::new(response_rx)),
        })
    }

    /// Session id assigned by the server, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    fn response_sender(&self) -> Result<mpsc::UnboundedSender<String>> {
        self.response_tx
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| McpChatError::Transport("HTTP transport is closed".into()).into())
    }

    async fn with_common_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(id) = self.session_id.read().await.as_deref() {
            req = req.header(SESSION_HEADER, id);
        }
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, message: String) -> Result<()> {
        let response_tx = self.response_sender()?;
        let req = self
            .http_client
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header(PROTOCOL_HEADER, LATEST_PROTOCOL_VERSION)
            .body(message);
        let req = self.with_common_headers(req).await;

        let response = req
            .send()
            .await
            .map_err(|e| McpChatError::Transport(format!("POST {} failed: {e}", self.endpoint)))?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND && self.session_id.read().await.is_some() {
            *self.session_id.write().await = None;
            return Err(McpChatError::Transport("MCP session expired".into()).into());
        }
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpChatError::Transport(format!(
                "POST {} returned HTTP {status}: {body}",
                self.endpoint
            ))
            .into());
        }

        if let Some(new_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        {
            let mut sid = self.session_id.write().await;
            if sid.is_none() {
                tracing::debug!(session_id = %new_id, "MCP session established");
                *sid = Some(new_id);
            }
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            let mut events = sse_events(response.bytes_stream());
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    match event {
                        Ok(event) if event.kind() == "message" => {
                            if response_tx.send(event.data).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("event-stream reply failed: {e:#}");
                            break;
                        }
                    }
                }
            });
        } else {
            let body = response.text().await.map_err(|e| {
                McpChatError::Transport(format!("failed to read response body: {e}"))
            })?;
            if !body.trim().is_empty() {
                let _ = response_tx.send(body);
            }
        }
        Ok(())
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.response_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let item = rx.lock().await.recv().await?;
            Some((item, rx))
        }))
    }

    /// End the server-side session with `DELETE`. Servers that do not allow
    /// explicit termination answer 405, which is not an error.
    async fn close(&self) -> Result<()> {
        if let Ok(mut slot) = self.response_tx.lock() {
            slot.take();
        }

        let Some(session_id) = self.session_id.write().await.take() else {
            return Ok(());
        };

        let mut req = self
            .http_client
            .delete(self.endpoint.as_str())
            .header(SESSION_HEADER, session_id.as_str());
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let response = req
            .send()
            .await
            .map_err(|e| McpChatError::Transport(format!("DELETE {} failed: {e}", self.endpoint)))?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(McpChatError::Transport(format!("DELETE {} returned HTTP {status}", self.endpoint)).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> HttpTransport {
        HttpTransport::new(
            Url::parse(&format!("{}/mcp", server.uri())).unwrap(),
            HashMap::new(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    /// A JSON reply body is delivered to `receive` and the session id kept.
    #[tokio::test]
    async fn test_json_reply_forwarded_and_session_captured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/json")
                    .insert_header(SESSION_HEADER, "sess-1")
                    .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": {} })),
            )
            .mount(&server)
            .await;

        let t = transport_for(&server);
        t.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.into())
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), t.receive().next())
            .await
            .unwrap()
            .unwrap();
        assert!(msg.contains("\"result\""));
        assert_eq!(t.session_id().await.as_deref(), Some("sess-1"));
    }

    /// Event-stream replies are split into messages.
    #[tokio::test]
    async fn test_event_stream_reply_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "event: message\ndata: {\"id\":1}\n\n".as_bytes().to_vec(),
                    "text/event-stream",
                ),
            )
            .mount(&server)
            .await;

        let t = transport_for(&server);
        t.send("{}".into()).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(2), t.receive().next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, r#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_accepted_has_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let t = transport_for(&server);
        t.send("{}".into()).await.unwrap();
        let next = tokio::time::timeout(Duration::from_millis(50), t.receive().next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = transport_for(&server).send("{}".into()).await.unwrap_err();
        match err.downcast_ref::<McpChatError>() {
            Some(McpChatError::Transport(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    /// Closing with an active session sends DELETE with the session header.
    #[tokio::test]
    async fn test_close_deletes_session() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(header(SESSION_HEADER, "sess-9"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport_for(&server);
        *t.session_id.write().await = Some("sess-9".to_string());
        t.close().await.unwrap();
        t.close().await.unwrap();
        assert!(t.receive().next().await.is_none());
    }
}
