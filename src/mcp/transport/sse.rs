//! Legacy HTTP+SSE transport
//!
//! The client opens a long-lived `GET` event stream. The server's first
//! event is `endpoint`, whose data is the (usually relative) URL the client
//! must `POST` its JSON-RPC messages to. Replies and server-initiated
//! messages then arrive on the event stream as `message` events.
//!
//! `open` returns once the endpoint has been announced. When the event
//! stream ends the inbound stream ends with it, which the session layer
//! treats as a lost connection.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{McpChatError, Result};
use crate::mcp::transport::Transport;
use crate::sse::sse_events;

/// HTTP+SSE transport for servers such as FastMCP's `/sse` endpoint.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use std::time::Duration;
/// use url::Url;
/// use mcpchat::mcp::transport::sse::SseTransport;
///
/// let transport = SseTransport::new(
///     Url::parse("http://localhost:8000/sse").unwrap(),
///     HashMap::new(),
///     Duration::from_secs(30),
/// ).unwrap();
/// ```
#[derive(Debug)]
pub struct SseTransport {
    http_client: reqwest::Client,
    url: Url,
    headers: HashMap<String, String>,
    request_timeout: Duration,
    /// POST target announced by the `endpoint` event.
    endpoint: RwLock<Option<Url>>,
    /// Handed to the event stream task on `open`; the task owning the only
    /// sender is what makes `receive` end with the stream.
    inbound_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<String>>>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    cancel: CancellationToken,
}

impl SseTransport {
    /// Build the transport. No network I/O happens until [`Transport::open`].
    ///
    /// `request_timeout` bounds each POST; the event stream itself is not
    /// subject to it.
    pub fn new(url: Url, headers: HashMap<String, String>, request_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(concat!("mcpchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(McpChatError::Http)?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            http_client,
            url,
            headers,
            request_timeout,
            endpoint: RwLock::new(None),
            inbound_tx: std::sync::Mutex::new(Some(inbound_tx)),
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            cancel: CancellationToken::new(),
        })
    }

    /// POST target, once announced.
    pub async fn endpoint(&self) -> Option<Url> {
        self.endpoint.read().await.clone()
    }

    fn take_inbound_sender(&self) -> Result<mpsc::UnboundedSender<String>> {
        self.inbound_tx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| McpChatError::Connection("SSE transport already opened".into()).into())
    }
}

/// Resolve the announced endpoint against the stream URL. The endpoint must
/// stay on the same origin as the stream.
fn resolve_endpoint(base: &Url, announced: &str) -> Result<Url> {
    let endpoint = base.join(announced.trim()).map_err(|e| {
        McpChatError::Protocol(format!("invalid endpoint '{announced}': {e}"))
    })?;
    if endpoint.origin() != base.origin() {
        return Err(McpChatError::Protocol(format!(
            "endpoint origin {} does not match {}",
            endpoint.origin().ascii_serialization(),
            base.origin().ascii_serialization()
        ))
        .into());
    }
    Ok(endpoint)
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    async fn open(&self) -> Result<()> {
        let inbound_tx = self.take_inbound_sender()?;

        let mut req = self
            .http_client
            .get(self.url.as_str())
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req.send().await.map_err(|e| {
            McpChatError::Connection(format!("GET {} failed: {e}", self.url))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(McpChatError::Connection(format!(
                "GET {} returned HTTP {status}",
                self.url
            ))
            .into());
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();
        let mut events = sse_events(response.bytes_stream());
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = events.next() => event,
                };
                match event {
                    Some(Ok(event)) => match event.kind() {
                        "endpoint" => {
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(event.data);
                            }
                        }
                        "message" => {
                            if inbound_tx.send(event.data).is_err() {
                                break;
                            }
                        }
                        other => tracing::debug!(event = other, "ignoring SSE event"),
                    },
                    Some(Err(e)) => {
                        tracing::warn!("SSE stream error: {e:#}");
                        break;
                    }
                    None => {
                        tracing::debug!("SSE stream closed by server");
                        break;
                    }
                }
            }
        });

        let announced = endpoint_rx.await.map_err(|_| {
            McpChatError::Connection("event stream ended before the endpoint was announced".into())
        })?;
        let endpoint = resolve_endpoint(&self.url, &announced)?;
        tracing::debug!(%endpoint, "SSE endpoint announced");
        *self.endpoint.write().await = Some(endpoint);
        Ok(())
    }

    async fn send(&self, message: String) -> Result<()> {
        let endpoint = self
            .endpoint()
            .await
            .ok_or_else(|| McpChatError::Transport("SSE endpoint not known yet".into()))?;

        let mut req = self
            .http_client
            .post(endpoint.as_str())
            .timeout(self.request_timeout)
            .header("Content-Type", "application/json")
            .body(message);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|e| McpChatError::Transport(format!("POST {endpoint} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpChatError::Transport(format!(
                "POST {endpoint} returned HTTP {status}: {body}"
            ))
            .into());
        }
        Ok(())
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let item = rx.lock().await.recv().await?;
            Some((item, rx))
        }))
    }

    async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        // Never opened: drop the unused sender so `receive` ends.
        if let Ok(mut slot) = self.inbound_tx.lock() {
            slot.take();
        }
        Ok(())
    }
}
