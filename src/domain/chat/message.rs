//! Message entity for conversations.
//!
//! Messages record user/assistant exchanges within a conversation. Ordering
//! is append-order and is the canonical history: messages are only ever
//! appended or truncated (on edit/regenerate), never reordered. Assistant
//! content is mutable while a stream is filling it in.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Timestamp;

/// Unique identifier for a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random MessageId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a MessageId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Role of a stored message.
///
/// System-role content is a per-request prefix and is never stored as a
/// message, so only the two user-visible roles exist here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input.
    User,
    /// AI assistant response.
    Assistant,
}

/// A message within a conversation.
///
/// # Invariants
///
/// - `id` is globally unique
/// - `created_at` is set at construction and never changes
/// - an assistant message with empty content and no error is a placeholder
///   awaiting its first token (or one that failed before any token arrived)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    role: Role,
    content: String,
    created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Message {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            created_at: Timestamp::now(),
            error: None,
        }
    }

    /// Creates an empty assistant placeholder to be filled by a stream.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: String::new(),
            created_at: Timestamp::now(),
            error: None,
        }
    }

    /// Creates a completed assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: content.into(),
            created_at: Timestamp::now(),
            error: None,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Replaces the content. Used while a stream accumulates assistant output
    /// and when an edit replaces a user message in place.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Attaches a stream failure to this message.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// True for an assistant message still awaiting its first token.
    pub fn is_pending(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty() && self.error.is_none()
    }

    /// True for an assistant message that never received content; such
    /// messages are excluded from upstream request payloads.
    pub fn is_empty_assistant(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty()
    }
}
