//! Chat stream port - the wire protocol between relay and client.
//!
//! The relay encodes [`StreamEvent`]s as SSE frames (`data: <json>\n\n`);
//! the client decodes them back. The event set is a closed tagged union and
//! consumers handle it exhaustively.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::domain::chat::TokenUsage;

/// Cancellable lazy sequence of decoded stream events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One event on the server-push stream.
///
/// A well-formed stream is zero or more `token` events, at most one `usage`
/// event, at most one `error` event, then exactly one `done` event. A
/// consumer that never sees `done` must treat the connection as abnormally
/// truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// An incremental text fragment.
    Token {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// Terminal usage summary for the exchange.
    Usage { usage: TokenUsage },
    /// Mid-stream failure; the stream still terminates with `done`.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Terminal event; always the last frame.
    Done,
}

impl StreamEvent {
    /// Creates a token event.
    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: Some(content.into()),
        }
    }

    /// Creates an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: Some(message.into()),
        }
    }
}

/// Body sent to the relay when opening a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatStreamRequest {
    /// Conversation history, empty assistant turns already excluded.
    pub messages: Vec<super::ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: u32,
}

/// Errors opening or running an event stream.
#[derive(Debug, thiserror::Error)]
pub enum ChatStreamError {
    /// The relay answered with a non-2xx status before any streaming began.
    #[error("request failed with status {status}: {body}")]
    Connection { status: u16, body: String },

    /// Transport failure before the stream opened.
    #[error("network error: {0}")]
    Network(String),
}

/// Port for opening a chat event stream against the relay.
///
/// Cancellation is cooperative: triggering the token stops the underlying
/// read promptly and the stream terminates without yielding further events.
/// A cancelled stream is a clean exit, never an error.
#[async_trait]
pub trait ChatStreamSource: Send + Sync {
    /// Opens a stream for the given request.
    async fn open(
        &self,
        request: ChatStreamRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, ChatStreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_event_serializes_with_type_tag() {
        let json = serde_json::to_string(&StreamEvent::token("Hi")).unwrap();
        assert_eq!(json, r#"{"type":"token","content":"Hi"}"#);
    }

    #[test]
    fn done_event_is_bare() {
        let json = serde_json::to_string(&StreamEvent::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }

    #[test]
    fn usage_event_round_trips() {
        let event = StreamEvent::Usage {
            usage: TokenUsage::new(7, 3),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""promptTokens":7"#));
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn error_event_message_is_optional() {
        let back: StreamEvent = serde_json::from_str(r#"{"type":"error"}"#).unwrap();
        assert_eq!(back, StreamEvent::Error { message: None });
    }

    #[test]
    fn unknown_event_type_fails_to_parse() {
        assert!(serde_json::from_str::<StreamEvent>(r#"{"type":"ping"}"#).is_err());
    }
}
