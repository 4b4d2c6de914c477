//! Conversation aggregate: an ordered message history with metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Message, MessageId, Timestamp, TokenUsage};

/// Title given to conversations until the first user message names them.
pub const DEFAULT_TITLE: &str = "New chat";

/// Number of characters taken from the first message for the auto-title.
pub const AUTO_TITLE_LEN: usize = 24;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Creates a new random ConversationId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ConversationId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A conversation thread owned by the chat store.
///
/// # Invariants
///
/// - `messages` is append-order history; it is truncated or appended, never
///   reordered
/// - `updated_at` is refreshed on any mutation to the conversation or its
///   messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: ConversationId,
    title: String,
    pinned: bool,
    created_at: Timestamp,
    updated_at: Timestamp,
    messages: Vec<Message>,
    usage: TokenUsage,
}

impl Conversation {
    /// Creates an empty conversation with the default title.
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            id: ConversationId::new(),
            title: DEFAULT_TITLE.to_string(),
            pinned: false,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            usage: TokenUsage::zero(),
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn pinned(&self) -> bool {
        self.pinned
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Refreshes `updated_at`.
    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }

    /// Renames the conversation.
    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    /// Flips the pinned flag.
    pub fn toggle_pin(&mut self) {
        self.pinned = !self.pinned;
        self.touch();
    }

    /// Replaces the reported token usage. Latest value wins; usage is not
    /// cumulative across turns.
    pub fn set_usage(&mut self, usage: TokenUsage) {
        self.usage = usage;
        self.touch();
    }

    /// Appends a message to the history.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Position of a message in the history, if present.
    pub fn message_index(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == id)
    }

    pub fn find_message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn find_message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id() == id)
    }

    /// Drops every message from `index` onward.
    pub fn truncate_at(&mut self, index: usize) {
        self.messages.truncate(index);
        self.touch();
    }

    /// Removes a single message by id. Returns false if it was not present.
    pub fn remove_message(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id() != id);
        let removed = self.messages.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Sets the title from the first user message while the title is still
    /// the default placeholder. Takes the first 24 characters.
    pub fn maybe_auto_title(&mut self, content: &str) {
        if self.title != DEFAULT_TITLE {
            return;
        }
        let title: String = content.chars().take(AUTO_TITLE_LEN).collect();
        if !title.is_empty() {
            self.title = title;
        }
    }

    /// History to send upstream: every message except assistant messages that
    /// never received content (the in-flight placeholder and failed turns).
    pub fn history_for_request(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_empty_assistant())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::Role;

    #[test]
    fn new_conversation_has_default_title_and_no_messages() {
        let conv = Conversation::new();
        assert_eq!(conv.title(), DEFAULT_TITLE);
        assert!(conv.messages().is_empty());
        assert!(!conv.pinned());
        assert_eq!(conv.usage(), TokenUsage::zero());
    }

    #[test]
    fn auto_title_takes_first_24_chars() {
        let mut conv = Conversation::new();
        conv.maybe_auto_title("this message is definitely longer than twenty-four characters");
        assert_eq!(conv.title().chars().count(), AUTO_TITLE_LEN);
    }

    #[test]
    fn auto_title_respects_multibyte_boundaries() {
        let mut conv = Conversation::new();
        conv.maybe_auto_title("日本語のタイトルをつけるとき、文字境界で切れること");
        assert!(conv.title().chars().count() <= AUTO_TITLE_LEN);
    }

    #[test]
    fn auto_title_does_not_replace_existing_title() {
        let mut conv = Conversation::new();
        conv.rename("kept");
        conv.maybe_auto_title("would-be title");
        assert_eq!(conv.title(), "kept");
    }

    #[test]
    fn push_message_refreshes_updated_at() {
        let mut conv = Conversation::new();
        let before = conv.updated_at();
        conv.push_message(Message::user("hi"));
        assert!(!conv.updated_at().is_before(&before));
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn truncate_at_drops_suffix_only() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("one"));
        conv.push_message(Message::assistant("reply one"));
        conv.push_message(Message::user("two"));
        conv.truncate_at(1);
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].content(), "one");
    }

    #[test]
    fn history_for_request_excludes_empty_assistant_messages() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("hi"));
        conv.push_message(Message::assistant_placeholder());

        let history: Vec<_> = conv.history_for_request().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role(), Role::User);
    }

    #[test]
    fn history_for_request_excludes_failed_empty_turns() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("hi"));
        let mut failed = Message::assistant_placeholder();
        failed.set_error("boom");
        conv.push_message(failed);
        conv.push_message(Message::user("again"));

        let history: Vec<_> = conv.history_for_request().collect();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn remove_message_is_noop_for_unknown_id() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("hi"));
        assert!(!conv.remove_message(MessageId::new()));
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn serializes_camel_case_fields() {
        let conv = Conversation::new();
        let json = serde_json::to_string(&conv).unwrap();
        assert!(json.contains("createdAt"));
        assert!(json.contains("updatedAt"));
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conv);
    }
}
