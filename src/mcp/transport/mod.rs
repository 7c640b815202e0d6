//! MCP transports and the connection state machine
//!
//! A [`Transport`] moves serialized JSON-RPC messages to and from one MCP
//! server. Concrete implementations:
//!
//! - [`sse::SseTransport`] -- legacy HTTP+SSE: a long-lived GET event stream
//!   plus a POST endpoint announced by the server.
//! - [`http::HttpTransport`] -- Streamable HTTP: one POST per message, with
//!   JSON or event-stream replies.
//! - [`fake::FakeTransport`] -- in-process peer for tests.
//!
//! [`TransportSession`] owns exactly one transport and drives it through
//! `Unconnected -> Connecting -> Connected -> Closed`. On connect it spawns
//! the reader and writer pumps that bridge the transport to an
//! [`RpcClient`]; `close` stops them and releases the transport once.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{McpChatError, Result};
use crate::mcp::client::{start_read_loop, RpcClient};
use crate::mcp::config::{ServerConfig, TransportKind};

pub mod fake;
pub mod http;
pub mod sse;

/// Abstraction over the wire to one MCP server.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Establish the connection. Returns once the transport can carry
    /// messages in both directions.
    async fn open(&self) -> Result<()>;

    /// Send one complete JSON-RPC message.
    async fn send(&self, message: String) -> Result<()>;

    /// Stream of inbound JSON-RPC messages. Ends when the peer disconnects
    /// or the transport is closed.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Release the connection.
    async fn close(&self) -> Result<()>;
}

/// Build the transport named by a server entry.
pub fn transport_for(server: &ServerConfig) -> Result<Arc<dyn Transport>> {
    let url = url::Url::parse(&server.url).map_err(|e| {
        McpChatError::Config(format!("server '{}' has invalid url: {e}", server.name))
    })?;
    let request_timeout = Duration::from_secs(server.request_timeout_seconds);
    let transport: Arc<dyn Transport> = match server.transport {
        TransportKind::Sse => Arc::new(sse::SseTransport::new(
            url,
            server.headers.clone(),
            request_timeout,
        )?),
        TransportKind::Http => Arc::new(http::HttpTransport::new(
            url,
            server.headers.clone(),
            request_timeout,
        )?),
    };
    Ok(transport)
}

/// Connection lifecycle of a [`TransportSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    /// Terminal. A new session must be built to reconnect.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Exclusive owner of one transport connection.
#[derive(Debug)]
pub struct TransportSession {
    transport: Arc<dyn Transport>,
    state: ConnectionState,
    cancel: CancellationToken,
}

impl TransportSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: ConnectionState::Unconnected,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open the transport within `timeout` and return an [`RpcClient`]
    /// wired to it.
    ///
    /// On failure the transport is released and the session is left
    /// `Closed`.
    ///
    /// # Errors
    ///
    /// [`McpChatError::Connection`] if the endpoint is unreachable, rejects
    /// the connection, or does not answer within `timeout`. Calling this
    /// on a session that is not `Unconnected` is also a connection error.
    pub async fn connect(&mut self, timeout: Duration) -> Result<RpcClient> {
        if self.state != ConnectionState::Unconnected {
            return Err(McpChatError::Connection(format!(
                "cannot connect a transport session that is {}",
                self.state
            ))
            .into());
        }
        self.state = ConnectionState::Connecting;

        let opened = match tokio::time::timeout(timeout, self.transport.open()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(McpChatError::Connection(format!("{e:#}"))),
            Err(_) => Err(McpChatError::Connection(format!(
                "no connection within {}s",
                timeout.as_secs_f64()
            ))),
        };
        if let Err(e) = opened {
            self.release().await;
            return Err(e.into());
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let client = RpcClient::new(outbound_tx);

        spawn_writer(Arc::clone(&self.transport), outbound_rx, self.cancel.clone());
        spawn_reader(Arc::clone(&self.transport), inbound_tx, self.cancel.clone());
        start_read_loop(inbound_rx, self.cancel.clone(), client.clone());

        self.state = ConnectionState::Connected;
        tracing::debug!(transport = ?self.transport, "transport connected");
        Ok(client)
    }

    /// Release the connection. Idempotent: the transport is closed at most
    /// once, and closing an unconnected session just marks it `Closed`.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error, if any. The session is `Closed`
    /// either way.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => Ok(()),
            ConnectionState::Unconnected => {
                self.state = ConnectionState::Closed;
                Ok(())
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.cancel.cancel();
                self.state = ConnectionState::Closed;
                self.transport.close().await
            }
        }
    }

    /// Close after a failed connect; errors are only logged.
    async fn release(&mut self) {
        if let Err(e) = self.close().await {
            tracing::warn!("error releasing transport after failed connect: {e:#}");
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Forward outbound messages to the transport. A send failure cancels the
/// session so in-flight requests fail fast instead of timing out.
fn spawn_writer(
    transport: Arc<dyn Transport>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                maybe_msg = outbound_rx.recv() => {
                    let Some(message) = maybe_msg else { break };
                    if let Err(e) = transport.send(message).await {
                        tracing::warn!("transport send failed, dropping connection: {e:#}");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    });
}

/// Forward inbound messages to the read loop. Dropping `inbound_tx` when
/// the stream ends is what tells the read loop the peer went away.
fn spawn_reader(
    transport: Arc<dyn Transport>,
    inbound_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut inbound = transport.receive();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                maybe_msg = inbound.next() => match maybe_msg {
                    Some(message) => {
                        if inbound_tx.send(message).is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("transport inbound stream ended");
                        break;
                    }
                },
            }
        }
    });
}
