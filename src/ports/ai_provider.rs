//! AI Provider port - the upstream session adapter contract.
//!
//! Wraps the model provider call: given a message sequence and parameters,
//! produce a lazy sequence of incremental token fragments plus a terminal
//! usage summary, or fail. Failures propagate to the caller immediately;
//! there is no retry at any layer, and dropping the returned stream releases
//! upstream resources.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::domain::chat::TokenUsage;

/// Lazy sequence of token fragments from the upstream provider.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, AiError>> + Send>>;

/// Port for the upstream token-generating session.
#[async_trait]
pub trait AIProvider: Send + Sync {
    /// Opens a streaming completion.
    ///
    /// Returns fragments as they arrive; the fragment carrying the usage
    /// summary is the last meaningful item. The consumer may stop pulling at
    /// any point to cancel the session.
    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream, AiError>;
}

/// Request for a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Full message sequence, including any synthetic leading system message.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature in [0, 2].
    pub temperature: f32,
    /// Completion token budget in [16, 4096].
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Creates a request with the given parameters and no messages.
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            messages: Vec::new(),
            temperature,
            max_tokens,
        }
    }

    /// Adds a message to the sequence.
    pub fn with_message(mut self, role: MessageRole, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::new(role, content));
        self
    }
}

/// A message in the upstream request sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a new message.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Role of a request message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions (request prefix, never stored as history).
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
}

impl MessageRole {
    /// Parses a wire role name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Incremental fragment from a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// New content in this fragment. May be empty on the usage fragment.
    pub delta: String,
    /// Usage summary, present on the terminal fragment when the provider
    /// reports one.
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// Creates a content fragment.
    pub fn content(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            usage: None,
        }
    }

    /// Creates a terminal fragment carrying the usage summary.
    pub fn usage(usage: TokenUsage) -> Self {
        Self {
            delta: String::new(),
            usage: Some(usage),
        }
    }
}

/// Upstream provider errors.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// API key or authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Rate limited by provider.
    #[error("rate limited by provider")]
    RateLimited,

    /// Provider is unavailable.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Provider rejected the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request timed out.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u32 },
}

impl AiError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_builder_works() {
        let request = CompletionRequest::new(0.7, 1024)
            .with_message(MessageRole::System, "Be concise")
            .with_message(MessageRole::User, "Hello");

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[1].content, "Hello");
    }

    #[test]
    fn message_role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn message_role_parses_wire_names() {
        assert_eq!(MessageRole::parse("system"), Some(MessageRole::System));
        assert_eq!(MessageRole::parse("tool"), None);
    }

    #[test]
    fn usage_chunk_has_empty_delta() {
        let chunk = StreamChunk::usage(TokenUsage::new(10, 5));
        assert!(chunk.delta.is_empty());
        assert_eq!(chunk.usage, Some(TokenUsage::new(10, 5)));
    }
}
