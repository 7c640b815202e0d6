//! Channel-backed JSON-RPC 2.0 client
//!
//! [`RpcClient`] never touches the wire. It writes serialized messages to an
//! outbound channel and is fed serialized messages by [`start_read_loop`];
//! the transport session pumps both channels. Requests are correlated with
//! responses through a `pending` map of oneshot senders keyed by request id.
//!
//! When the read loop stops (cancellation or inbound channel closed) every
//! pending sender is dropped, so in-flight requests fail with a
//! [`McpChatError::Transport`] error instead of waiting for their timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{McpChatError, Result};
use crate::mcp::types::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ERROR_INTERNAL, ERROR_METHOD_NOT_FOUND,
    METHOD_PING, NOTIF_MESSAGE, NOTIF_PROGRESS,
};

/// Timeout applied when the caller does not pass one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = HashMap<u64, oneshot::Sender<std::result::Result<Value, JsonRpcError>>>;

/// JSON-RPC 2.0 client over a pair of string channels.
///
/// Cloning is cheap and every clone shares the id counter and pending map,
/// so the read loop can hold one clone while callers hold another.
#[derive(Clone)]
pub struct RpcClient {
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<PendingMap>>,
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Create a client writing to `outbound_tx`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use mcpchat::mcp::client::RpcClient;
    ///
    /// let (tx, _rx) = mpsc::unbounded_channel::<String>();
    /// let client = RpcClient::new(tx);
    /// assert!(client.is_open());
    /// ```
    pub fn new(outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            outbound_tx,
        }
    }

    /// Whether the outbound side is still connected to a writer.
    pub fn is_open(&self) -> bool {
        !self.outbound_tx.is_closed()
    }

    /// Send a request and wait for its typed result.
    ///
    /// # Errors
    ///
    /// - [`McpChatError::Transport`] if the connection is closed, is lost
    ///   before the reply arrives, or the reply does not arrive in time.
    /// - [`McpChatError::Remote`] if the server answers with an error object.
    /// - [`McpChatError::Protocol`] if the result cannot be decoded as `R`.
    pub async fn request<P, R>(&self, method: &str, params: P, timeout: Option<Duration>) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Register before sending so a fast reply always finds its slot.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = serde_json::to_string(&JsonRpcRequest::new(
            id,
            method,
            serde_json::to_value(params)?,
        ))?;

        if self.outbound_tx.send(message).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(McpChatError::Transport(format!(
                "connection closed before '{method}' could be sent"
            ))
            .into());
        }
        tracing::debug!(id, method, "JSON-RPC request sent");

        let deadline = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(McpChatError::Transport(format!(
                    "'{method}' timed out after {}s",
                    deadline.as_secs_f64()
                ))
                .into());
            }
        };

        let value = outcome
            .map_err(|_| {
                McpChatError::Transport(format!("connection lost while waiting for '{method}'"))
            })?
            .map_err(McpChatError::Remote)?;

        serde_json::from_value(value).map_err(|e| {
            McpChatError::Protocol(format!("could not decode '{method}' result: {e}")).into()
        })
    }

    /// Send a notification. No reply is expected.
    pub fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let message = serde_json::to_string(&JsonRpcRequest::notification(
            method,
            serde_json::to_value(params)?,
        ))?;

        self.outbound_tx
            .send(message)
            .map_err(|_| McpChatError::Transport(format!("connection closed before '{method}'")))?;
        Ok(())
    }

    async fn fail_pending(&self) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "dropping in-flight JSON-RPC requests");
        }
        pending.clear();
    }
}

/// Spawn the task that dispatches inbound messages for `client`.
///
/// Responses resolve pending requests. Server-initiated `ping` requests are
/// answered; any other server request gets `-32601 Method not found`, since
/// the client advertises no server-to-client capabilities. Progress and log
/// notifications are forwarded to `tracing`.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: RpcClient,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                maybe_msg = inbound_rx.recv() => match maybe_msg {
                    Some(raw) => dispatch_message(&raw, &client).await,
                    None => break,
                },
            }
        }
        client.fail_pending().await;
    })
}

async fn dispatch_message(raw: &str, client: &RpcClient) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("ignoring inbound message that is not JSON: {e}");
            return;
        }
    };

    let has_id = value.get("id").map(|id| !id.is_null()).unwrap_or(false);
    let method = value.get("method").and_then(Value::as_str);

    match (has_id, method) {
        (true, None) => handle_response(value, client).await,
        (true, Some(method)) => handle_server_request(method, &value, client),
        (false, Some(method)) => handle_notification(method, &value),
        (false, None) => tracing::debug!("ignoring unclassifiable inbound message"),
    }
}

async fn handle_response(value: Value, client: &RpcClient) {
    let id_val = &value["id"];
    let Some(id) = id_val
        .as_u64()
        .or_else(|| id_val.as_str().and_then(|s| s.parse().ok()))
    else {
        tracing::warn!("response has non-integer id: {id_val}");
        return;
    };

    let Some(tx) = client.pending.lock().await.remove(&id) else {
        tracing::debug!(id, "response for unknown or expired request");
        return;
    };

    let outcome = match value.get("error") {
        Some(error_val) => Err(serde_json::from_value::<JsonRpcError>(error_val.clone())
            .unwrap_or_else(|_| JsonRpcError {
                code: ERROR_INTERNAL,
                message: format!("malformed error object: {error_val}"),
                data: None,
            })),
        None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
    };

    // The caller may already have timed out.
    let _ = tx.send(outcome);
}

fn handle_server_request(method: &str, value: &Value, client: &RpcClient) {
    let id = value.get("id").cloned();
    let response = if method == METHOD_PING {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(serde_json::json!({})),
            error: None,
        }
    } else {
        tracing::debug!(method, "rejecting unsupported server request");
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: ERROR_METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
                data: None,
            }),
        }
    };

    if let Ok(serialized) = serde_json::to_string(&response) {
        let _ = client.outbound_tx.send(serialized);
    }
}

fn handle_notification(method: &str, value: &Value) {
    let params = value.get("params").cloned().unwrap_or(Value::Null);
    match method {
        NOTIF_PROGRESS => {
            let progress = params.get("progress").and_then(Value::as_f64);
            let total = params.get("total").and_then(Value::as_f64);
            tracing::info!(?progress, ?total, "server progress");
        }
        NOTIF_MESSAGE => {
            let level = params.get("level").and_then(Value::as_str).unwrap_or("info");
            let data = params.get("data").cloned().unwrap_or(Value::Null);
            match level {
                "debug" => tracing::debug!(%data, "server log"),
                "info" | "notice" => tracing::info!(%data, "server log"),
                "warning" => tracing::warn!(%data, "server log"),
                _ => tracing::error!(%data, level, "server log"),
            }
        }
        _ => tracing::debug!(method, "ignoring server notification"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_client() -> (
        RpcClient,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<String>,
        CancellationToken,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let token = CancellationToken::new();
        let client = RpcClient::new(out_tx);
        start_read_loop(in_rx, token.clone(), client.clone());
        (client, out_rx, in_tx, token)
    }

    /// Answer the next outbound request with `reply` built from its id.
    fn respond_once(
        mut out_rx: mpsc::UnboundedReceiver<String>,
        in_tx: mpsc::UnboundedSender<String>,
        reply: impl FnOnce(Value) -> Value + Send + 'static,
    ) {
        tokio::spawn(async move {
            let sent = out_rx.recv().await.unwrap();
            let req: Value = serde_json::from_str(&sent).unwrap();
            in_tx.send(reply(req["id"].clone()).to_string()).unwrap();
        });
    }

    #[tokio::test]
    async fn test_request_resolves_with_decoded_result() {
        let (client, out_rx, in_tx, _token) = make_client();
        respond_once(out_rx, in_tx, |id| {
            json!({ "jsonrpc": "2.0", "id": id, "result": { "tools": [] } })
        });

        #[derive(serde::Deserialize)]
        struct Tools {
            tools: Vec<Value>,
        }

        let result: Tools = client
            .request("tools/list", json!({}), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(result.tools.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error_and_clears_slot() {
        let (client, _out_rx, _in_tx, _token) = make_client();

        let err = client
            .request::<_, Value>("tools/list", json!({}), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<McpChatError>(),
            Some(McpChatError::Transport(msg)) if msg.contains("timed out")
        ));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_error_response_becomes_remote_error() {
        let (client, out_rx, in_tx, _token) = make_client();
        respond_once(out_rx, in_tx, |id| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "Method not found" }
            })
        });

        let err = client
            .request::<_, Value>("nonexistent", json!({}), Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        match err.downcast_ref::<McpChatError>() {
            Some(McpChatError::Remote(e)) => assert_eq!(e.code, -32601),
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_result_is_protocol_error() {
        let (client, out_rx, in_tx, _token) = make_client();
        respond_once(out_rx, in_tx, |id| {
            json!({ "jsonrpc": "2.0", "id": id, "result": { "tools": "nope" } })
        });

        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Tools {
            tools: Vec<Value>,
        }

        let err = client
            .request::<_, Tools>("tools/list", json!({}), Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpChatError>(),
            Some(McpChatError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_read_loop_fails_in_flight_request() {
        let (client, _out_rx, _in_tx, token) = make_client();

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .request::<_, Value>("tools/call", json!({}), Some(Duration::from_secs(10)))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("request did not finish after loop exit")
            .expect("task panicked");
        let err = outcome.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpChatError>(),
            Some(McpChatError::Transport(msg)) if msg.contains("connection lost")
        ));
    }

    #[tokio::test]
    async fn test_server_ping_is_answered() {
        let (_client, mut out_rx, in_tx, _token) = make_client();
        in_tx
            .send(json!({ "jsonrpc": "2.0", "id": 99, "method": "ping" }).to_string())
            .unwrap();

        let raw = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(reply["id"], 99);
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn test_unknown_server_request_gets_method_not_found() {
        let (_client, mut out_rx, in_tx, _token) = make_client();
        in_tx
            .send(
                json!({ "jsonrpc": "2.0", "id": "s1", "method": "sampling/createMessage" })
                    .to_string(),
            )
            .unwrap();

        let raw = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_distinct_ids() {
        let (client, mut out_rx, in_tx, _token) = make_client();
        tokio::spawn(async move {
            while let Some(raw) = out_rx.recv().await {
                let req: Value = serde_json::from_str(&raw).unwrap();
                let reply = json!({ "jsonrpc": "2.0", "id": req["id"], "result": { "echo": req["id"] } });
                in_tx.send(reply.to_string()).unwrap();
            }
        });

        let timeout = Some(Duration::from_secs(5));
        let (r1, r2, r3) = tokio::join!(
            client.request::<_, Value>("ping", json!({}), timeout),
            client.request::<_, Value>("ping", json!({}), timeout),
            client.request::<_, Value>("ping", json!({}), timeout),
        );
        let ids: std::collections::HashSet<u64> = [r1.unwrap(), r2.unwrap(), r3.unwrap()]
            .into_iter()
            .map(|v| v["echo"].as_u64().unwrap())
            .collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_notify_fails_when_channel_closed() {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        drop(out_rx);
        let client = RpcClient::new(out_tx);
        assert!(!client.is_open());
        assert!(client.notify("notifications/initialized", json!({})).is_err());
    }
}
