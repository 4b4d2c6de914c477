//! HTTP handler for the chat relay endpoint.
//!
//! One relay instance runs per request and walks four states:
//! validating the body, dispatching the upstream session, re-framing
//! upstream fragments as SSE events, and terminating. The stream always
//! ends with a `done` frame: from success, and from mid-stream failure.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;

use crate::domain::chat::TokenUsage;
use crate::ports::{AIProvider, ChunkStream, CompletionRequest, MessageRole, StreamEvent};

use super::dto::validate_chat_request;

/// Shared state for the relay endpoint.
#[derive(Clone)]
pub struct ChatAppState {
    /// Upstream provider; `None` when no API credential is configured.
    pub provider: Option<Arc<dyn AIProvider>>,
}

impl ChatAppState {
    /// Creates state with a configured provider.
    pub fn new(provider: Arc<dyn AIProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Creates state without an upstream credential.
    pub fn without_provider() -> Self {
        Self { provider: None }
    }
}

/// POST /chat - relay a chat request as a server-push event stream.
///
/// - Malformed JSON or schema violations fail fast with a `400` JSON body;
///   no stream is opened.
/// - A missing upstream credential answers `500` with a single stream-framed
///   error so streaming-only clients get a clean signal.
/// - Upstream dispatch failure before any event answers `500` JSON.
/// - Otherwise the response is a `text/event-stream` that always terminates
///   with a `done` frame.
pub async fn chat_stream(State(state): State<ChatAppState>, body: Bytes) -> Response {
    // Validating
    let body: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid JSON body"})),
            )
                .into_response();
        }
    };

    let request = match validate_chat_request(&body) {
        Ok(request) => request,
        Err(errors) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": errors}))).into_response();
        }
    };

    let Some(provider) = state.provider else {
        tracing::warn!("chat request received without a configured API key");
        return error_frame_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "API key is not configured",
        );
    };

    // Dispatching
    let mut completion = CompletionRequest::new(request.temperature, request.max_tokens);
    if let Some(system) = request.system {
        completion = completion.with_message(MessageRole::System, system);
    }
    completion.messages.extend(request.messages);

    let upstream = match provider.stream_complete(completion).await {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::error!(error = %err, "upstream dispatch failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
                .into_response();
        }
    };

    // Streaming -> Terminated
    let events = relay_events(upstream).map(|event| match serde_json::to_string(&event) {
        Ok(data) => Ok::<Event, Infallible>(Event::default().data(data)),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode stream event");
            Ok(Event::default().data(r#"{"type":"error"}"#))
        }
    });

    (
        [(header::CACHE_CONTROL, "no-cache, no-transform")],
        Sse::new(events),
    )
        .into_response()
}

/// Re-frames the upstream fragment stream as wire events.
///
/// Emits a `token` event per non-empty fragment, stashes the usage summary
/// and emits it exactly once before the terminal event, converts an upstream
/// failure into one `error` event, and unconditionally ends with `done`.
pub fn relay_events(upstream: ChunkStream) -> impl Stream<Item = StreamEvent> + Send {
    enum Phase {
        Streaming,
        Tail,
        Errored(String),
        Done,
        Closed,
    }

    struct RelayState {
        upstream: ChunkStream,
        usage: Option<TokenUsage>,
        phase: Phase,
    }

    let state = RelayState {
        upstream,
        usage: None,
        phase: Phase::Streaming,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            match std::mem::replace(&mut st.phase, Phase::Closed) {
                Phase::Streaming => match st.upstream.next().await {
                    Some(Ok(chunk)) => {
                        st.phase = Phase::Streaming;
                        if let Some(usage) = chunk.usage {
                            st.usage = Some(usage);
                        }
                        if !chunk.delta.is_empty() {
                            return Some((StreamEvent::token(chunk.delta), st));
                        }
                    }
                    Some(Err(err)) => {
                        tracing::error!(error = %err, "upstream stream failed");
                        st.phase = Phase::Errored(err.to_string());
                    }
                    None => st.phase = Phase::Tail,
                },
                Phase::Tail => {
                    st.phase = Phase::Done;
                    if let Some(usage) = st.usage.take() {
                        return Some((StreamEvent::Usage { usage }, st));
                    }
                }
                Phase::Errored(message) => {
                    st.phase = Phase::Done;
                    return Some((StreamEvent::error(message), st));
                }
                Phase::Done => {
                    st.phase = Phase::Closed;
                    return Some((StreamEvent::Done, st));
                }
                Phase::Closed => return None,
            }
        }
    })
}

/// A non-2xx response whose body is a single stream-framed error event, for
/// callers that only understand the streaming protocol.
fn error_frame_response(status: StatusCode, message: &str) -> Response {
    let event = StreamEvent::error(message);
    let frame = match serde_json::to_string(&event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(_) => "data: {\"type\":\"error\"}\n\n".to_string(),
    };
    (
        status,
        [(header::CONTENT_TYPE, "text/event-stream")],
        frame,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{AiError, StreamChunk};

    fn upstream(items: Vec<Result<StreamChunk, AiError>>) -> ChunkStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn relay_ends_with_done_on_success() {
        let events: Vec<_> = relay_events(upstream(vec![
            Ok(StreamChunk::content("Hel")),
            Ok(StreamChunk::content("lo")),
            Ok(StreamChunk::usage(TokenUsage::new(3, 2))),
        ]))
        .collect()
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::token("Hel"),
                StreamEvent::token("lo"),
                StreamEvent::Usage {
                    usage: TokenUsage::new(3, 2)
                },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn relay_ends_with_done_after_mid_stream_error() {
        let events: Vec<_> = relay_events(upstream(vec![
            Ok(StreamChunk::content("par")),
            Err(AiError::unavailable("upstream broke")),
        ]))
        .collect()
        .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::token("par"));
        assert!(matches!(events[1], StreamEvent::Error { .. }));
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[tokio::test]
    async fn relay_emits_done_for_empty_upstream() {
        let events: Vec<_> = relay_events(upstream(vec![])).collect().await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn relay_skips_empty_fragments() {
        let events: Vec<_> = relay_events(upstream(vec![
            Ok(StreamChunk::content("")),
            Ok(StreamChunk::content("x")),
        ]))
        .collect()
        .await;

        assert_eq!(events, vec![StreamEvent::token("x"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn relay_emits_usage_at_most_once() {
        let events: Vec<_> = relay_events(upstream(vec![
            Ok(StreamChunk::usage(TokenUsage::new(1, 1))),
            Ok(StreamChunk::usage(TokenUsage::new(9, 9))),
        ]))
        .collect()
        .await;

        let usages: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Usage { .. }))
            .collect();
        assert_eq!(usages.len(), 1);
        // Latest report wins.
        assert_eq!(
            usages[0],
            &StreamEvent::Usage {
                usage: TokenUsage::new(9, 9)
            }
        );
    }
}
