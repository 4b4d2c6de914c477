//! Event-stream client - decodes the relay's server-push stream.
//!
//! Opens a POST negotiating `text/event-stream`, splits the byte stream on
//! the `\n\n` record boundary, and yields typed [`StreamEvent`]s. Unknown or
//! malformed records are logged and skipped, never fatal. Cancellation stops
//! the underlying read promptly and terminates the stream cleanly; it is not
//! surfaced as an error. A transport failure mid-stream that is *not* a
//! cancellation is surfaced as a final `error` event so the consumer can
//! record it against the in-flight message.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::ports::{
    ChatStreamError, ChatStreamRequest, ChatStreamSource, EventStream, StreamEvent,
};

/// Sentinel payload some relays emit instead of a typed `done` event.
const DONE_SENTINEL: &str = "[DONE]";

/// HTTP client for the relay's `/chat` endpoint.
#[derive(Debug, Clone)]
pub struct SseChatClient {
    client: Client,
    endpoint: String,
}

impl SseChatClient {
    /// Creates a client for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ChatStreamSource for SseChatClient {
    async fn open(
        &self,
        request: ChatStreamRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, ChatStreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatStreamError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatStreamError::Connection {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(endpoint = %self.endpoint, "event stream opened");
        Ok(Box::pin(decode_event_stream(
            Box::pin(response.bytes_stream()),
            cancel,
        )))
    }
}

/// Decodes a raw byte stream into events, honoring cancellation.
fn decode_event_stream<S, B>(
    bytes: Pin<Box<S>>,
    cancel: CancellationToken,
) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = reqwest::Result<B>> + Send + ?Sized,
    B: AsRef<[u8]>,
{
    struct ClientState<S: ?Sized> {
        bytes: Pin<Box<S>>,
        buffer: String,
        pending: VecDeque<StreamEvent>,
        cancel: CancellationToken,
        finished: bool,
    }

    let state = ClientState {
        bytes,
        buffer: String::new(),
        pending: VecDeque::new(),
        cancel,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                if matches!(event, StreamEvent::Done) {
                    // `done` is terminal: anything decoded behind it is dropped.
                    st.finished = true;
                    st.pending.clear();
                }
                return Some((event, st));
            }
            if st.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => None,
                chunk = st.bytes.next() => chunk,
            };

            match next {
                Some(Ok(chunk)) => {
                    st.buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));
                    for record in drain_records(&mut st.buffer) {
                        if let Some(event) = parse_record(&record) {
                            st.pending.push_back(event);
                        }
                    }
                }
                Some(Err(err)) => {
                    st.finished = true;
                    if !st.cancel.is_cancelled() {
                        tracing::error!(error = %err, "event stream transport failed");
                        st.pending
                            .push_back(StreamEvent::error("connection to the server was lost"));
                    }
                }
                // Cancelled or server closed the connection.
                None => st.finished = true,
            }
        }
    })
}

/// Splits complete records off the front of the buffer at `\n\n` boundaries,
/// leaving any partial record in place for the next read.
fn drain_records(buffer: &mut String) -> Vec<String> {
    let mut records = Vec::new();
    while let Some(boundary) = buffer.find("\n\n") {
        let record: String = buffer.drain(..boundary + 2).collect();
        records.push(record.trim().to_string());
    }
    records
}

/// Parses one record into a typed event.
///
/// Returns `None` for non-data records, the malformed, and the unknown;
/// those are skipped rather than failing the stream.
fn parse_record(record: &str) -> Option<StreamEvent> {
    let data = record.strip_prefix("data:")?.trim_start();
    if data == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(error = %err, "skipping malformed stream record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::TokenUsage;

    #[test]
    fn parses_each_event_kind() {
        assert_eq!(
            parse_record(r#"data: {"type":"token","content":"Hi"}"#),
            Some(StreamEvent::token("Hi"))
        );
        assert_eq!(
            parse_record(
                r#"data: {"type":"usage","usage":{"promptTokens":1,"completionTokens":2,"totalTokens":3}}"#
            ),
            Some(StreamEvent::Usage {
                usage: TokenUsage::new(1, 2)
            })
        );
        assert_eq!(
            parse_record(r#"data: {"type":"error","message":"boom"}"#),
            Some(StreamEvent::error("boom"))
        );
        assert_eq!(
            parse_record(r#"data: {"type":"done"}"#),
            Some(StreamEvent::Done)
        );
    }

    #[test]
    fn done_sentinel_is_accepted() {
        assert_eq!(parse_record("data: [DONE]"), Some(StreamEvent::Done));
    }

    #[test]
    fn malformed_and_unknown_records_are_skipped() {
        assert_eq!(parse_record("data: {oops"), None);
        assert_eq!(parse_record(r#"data: {"type":"ping"}"#), None);
        assert_eq!(parse_record(": comment"), None);
    }

    #[test]
    fn drain_records_handles_split_frames() {
        let mut buffer = String::from("data: {\"type\":\"token\",\"content\":\"a\"}\n\ndata: {\"ty");
        let records = drain_records(&mut buffer);
        assert_eq!(records.len(), 1);
        assert_eq!(buffer, "data: {\"ty");

        buffer.push_str("pe\":\"done\"}\n\n");
        let records = drain_records(&mut buffer);
        assert_eq!(records.len(), 1);
        assert_eq!(parse_record(&records[0]), Some(StreamEvent::Done));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn decoder_stops_after_done() {
        let frames = vec![
            Ok::<_, reqwest::Error>("data: {\"type\":\"token\",\"content\":\"x\"}\n\n".as_bytes()),
            Ok("data: {\"type\":\"done\"}\n\ndata: {\"type\":\"token\",\"content\":\"late\"}\n\n"
                .as_bytes()),
        ];
        let events: Vec<_> = decode_event_stream(
            Box::pin(stream::iter(frames)),
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(events, vec![StreamEvent::token("x"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn frames_behind_done_in_the_same_chunk_are_dropped() {
        let frames = vec![Ok::<_, reqwest::Error>(
            "data: {\"type\":\"token\",\"content\":\"a\"}\n\n\
             data: {\"type\":\"done\"}\n\n\
             data: {\"type\":\"token\",\"content\":\"late\"}\n\n"
                .as_bytes(),
        )];
        let events: Vec<_> = decode_event_stream(
            Box::pin(stream::iter(frames)),
            CancellationToken::new(),
        )
        .collect()
        .await;

        assert_eq!(events, vec![StreamEvent::token("a"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn pre_cancelled_token_yields_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let frames = vec![Ok::<_, reqwest::Error>(
            "data: {\"type\":\"token\",\"content\":\"x\"}\n\n".as_bytes(),
        )];
        let events: Vec<_> = decode_event_stream(Box::pin(stream::iter(frames)), cancel)
            .collect()
            .await;

        assert!(events.is_empty());
    }
}
