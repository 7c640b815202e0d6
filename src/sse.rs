//! Server-sent events decoding
//!
//! Both MCP HTTP transports and the OpenAI-compatible streaming endpoint
//! deliver `text/event-stream` bodies. [`SseDecoder`] turns arbitrary byte
//! chunks into complete [`SseEvent`]s; [`sse_events`] wraps a response body
//! stream into a lazy stream of events.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{McpChatError, Result};

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// `event:` field, `None` for the default `message` type.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// `id:` field.
    pub id: Option<String>,
}

impl SseEvent {
    /// Event type with the SSE default applied.
    pub fn kind(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental event-stream decoder.
///
/// Carriage returns are dropped on input, so `\r\n` framing decodes like
/// `\n` framing. Bytes are buffered until a blank line completes an event,
/// which keeps multi-byte UTF-8 sequences split across chunks intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_event_block(&String::from_utf8_lossy(&block[..pos])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let block = std::mem::take(&mut self.buffer);
        parse_event_block(&String::from_utf8_lossy(&block))
    }
}

/// Parse the field lines of one event. Blocks holding only comments or
/// no `data:` line at all produce no event.
pub fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => event.event = Some(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            // retry and unknown fields
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

/// Boxed stream of decoded events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent>> + Send>>;

/// Adapt an HTTP body stream into a lazy stream of events. A body read
/// error is yielded once and ends the stream.
pub fn sse_events<S>(body: S) -> EventStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    struct State<S> {
        body: Pin<Box<S>>,
        decoder: SseDecoder,
        ready: VecDeque<SseEvent>,
        done: bool,
    }

    let state = State {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.ready.extend(events);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(McpChatError::Http(e).into()), state));
                }
                None => {
                    state.done = true;
                    if let Some(event) = state.decoder.finish() {
                        state.ready.push_back(event);
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"jsonrpc\":\"2.0\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, r#"{"jsonrpc":"2.0"}"#);
        assert_eq!(events[0].kind(), "message");
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: endpoint\nda").is_empty());
        let events = decoder.push(b"ta: /messages/?session_id=abc\n\n");
        assert_eq!(events[0].kind(), "endpoint");
        assert_eq!(events[0].data, "/messages/?session_id=abc");
    }

    #[test]
    fn test_crlf_framing() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"id: 7\r\ndata: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn test_multiline_data_joined() {
        let event = parse_event_block("data: a\ndata: b").unwrap();
        assert_eq!(event.data, "a\nb");
    }

    #[test]
    fn test_comment_only_block_ignored() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b": ping - 2024-01-01\n\n").is_empty());
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let split = bytes.len() - 3;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let events = decoder.push(&bytes[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish().unwrap().data, "[DONE]");
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn test_sse_events_stream() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: first\n\ndata: sec")),
            Ok(Bytes::from_static(b"ond\n\n")),
        ];
        let events: Vec<SseEvent> = sse_events(futures::stream::iter(chunks))
            .map(|e| e.unwrap())
            .collect()
            .await;
        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["first", "second"]);
    }
}
