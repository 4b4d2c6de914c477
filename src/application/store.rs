//! Chat store - the client-side state machine behind the conversation UI.
//!
//! All state lives behind a single `RwLock`; every public operation takes
//! the write lock once, mutates, and releases, so each operation is atomic
//! with respect to concurrent readers and other operations. Observers always
//! see either the state before an operation or the state after it, never a
//! partially applied one.
//!
//! The store holds no I/O. Streaming is driven by the orchestrator, which
//! applies the resulting mutations here; persistence goes through
//! [`StoreSnapshot`] and a `SnapshotStore` adapter.

use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::domain::chat::{
    ChatSettings, Conversation, ConversationId, Message, MessageId, Role, TokenUsage,
    MAX_MAX_TOKENS, MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE,
};
use crate::ports::{ChatMessage, ChatStreamRequest, StoreSnapshot, SNAPSHOT_VERSION};

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("message content is empty")]
    EmptyContent,

    #[error("no user message precedes the assistant message")]
    NoUserMessage,

    #[error("a stream is already in flight")]
    StreamInFlight,
}

/// Composer state: the draft input and, when editing, which message the
/// draft will replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposerState {
    /// Current draft text.
    pub input: String,
    /// Message being edited, if the composer is in edit mode.
    pub editing_message_id: Option<MessageId>,
}

/// The stream currently being applied to the store, if any.
///
/// The store is locked for sending while this is present; there is no
/// separate flag to drift out of sync.
#[derive(Debug, Clone)]
pub struct StreamingState {
    /// Conversation receiving the stream.
    pub conversation_id: ConversationId,
    /// Assistant placeholder being filled in.
    pub message_id: MessageId,
    cancel: CancellationToken,
}

impl StreamingState {
    /// Token that aborts the in-flight stream when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[derive(Debug)]
struct ChatState {
    conversations: Vec<Conversation>,
    current_id: Option<ConversationId>,
    search_query: String,
    settings: ChatSettings,
    composer: ComposerState,
    streaming: Option<StreamingState>,
}

impl ChatState {
    fn fresh() -> Self {
        let conversation = Conversation::new();
        let current_id = Some(conversation.id());
        Self {
            conversations: vec![conversation],
            current_id,
            search_query: String::new(),
            settings: ChatSettings::default(),
            composer: ComposerState::default(),
            streaming: None,
        }
    }

    fn conversation(&self, id: ConversationId) -> Result<&Conversation, StoreError> {
        self.conversations
            .iter()
            .find(|c| c.id() == id)
            .ok_or(StoreError::ConversationNotFound(id))
    }

    fn conversation_mut(&mut self, id: ConversationId) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(StoreError::ConversationNotFound(id))
    }

    /// Stages trimmed user content: replaces the edited message in place and
    /// truncates the suffix when the composer is in edit mode, appends a new
    /// user message otherwise. Resets the composer on success. Fails before
    /// any mutation.
    fn stage_user_message(
        &mut self,
        conversation_id: ConversationId,
        content: String,
    ) -> Result<MessageId, StoreError> {
        let editing = self.composer.editing_message_id;
        let conversation = self.conversation_mut(conversation_id)?;

        let message_id = match editing {
            Some(editing_id) => {
                let index = conversation
                    .message_index(editing_id)
                    .ok_or(StoreError::MessageNotFound(editing_id))?;
                let edited_role = {
                    let message = conversation
                        .find_message_mut(editing_id)
                        .ok_or(StoreError::MessageNotFound(editing_id))?;
                    message.set_content(content.clone());
                    message.role()
                };
                conversation.truncate_at(index + 1);
                if edited_role == Role::User {
                    conversation.maybe_auto_title(&content);
                }
                editing_id
            }
            None => {
                let message = Message::user(content.clone());
                let id = message.id();
                conversation.push_message(message);
                conversation.maybe_auto_title(&content);
                id
            }
        };

        self.composer = ComposerState::default();
        Ok(message_id)
    }

    /// Builds the outgoing request from a conversation's history, minus empty
    /// assistant turns, with the current settings.
    fn request_payload(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ChatStreamRequest, StoreError> {
        let conversation = self.conversation(conversation_id)?;
        let messages = conversation
            .history_for_request()
            .map(|m| {
                let role = match m.role() {
                    Role::User => crate::ports::MessageRole::User,
                    Role::Assistant => crate::ports::MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content())
            })
            .collect();
        Ok(ChatStreamRequest {
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        })
    }

    /// Keeps `current_id` pointing at an existing conversation, recreating a
    /// default conversation when the list is empty.
    fn ensure_selection(&mut self) {
        if self.conversations.is_empty() {
            let conversation = Conversation::new();
            self.current_id = Some(conversation.id());
            self.conversations.push(conversation);
            return;
        }
        let valid = self
            .current_id
            .map(|id| self.conversations.iter().any(|c| c.id() == id))
            .unwrap_or(false);
        if !valid {
            self.current_id = Some(self.conversations[0].id());
        }
    }
}

/// Thread-safe chat state.
///
/// Cheap to share behind an `Arc`; reads clone the data they return so no
/// lock guard ever escapes.
#[derive(Debug)]
pub struct ChatStore {
    state: RwLock<ChatState>,
}

impl ChatStore {
    /// Creates a store with one empty conversation selected.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ChatState::fresh()),
        }
    }

    /// Rebuilds a store from a persisted snapshot.
    ///
    /// An invalid or missing `current_id` falls back to the first
    /// conversation; an empty snapshot yields the same state as [`new`].
    /// Streaming and composer state are transient and never restored.
    ///
    /// [`new`]: ChatStore::new
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut state = ChatState {
            conversations: snapshot.conversations,
            current_id: snapshot.current_id,
            search_query: String::new(),
            settings: snapshot.settings,
            composer: ComposerState::default(),
            streaming: None,
        };
        state.ensure_selection();
        Self {
            state: RwLock::new(state),
        }
    }

    /// Captures the persistable state.
    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().unwrap();
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            conversations: state.conversations.clone(),
            current_id: state.current_id,
            settings: state.settings.clone(),
        }
    }

    // ---- conversation management -------------------------------------

    /// Creates an empty conversation, inserts it at the front of the list,
    /// selects it, and resets the composer.
    pub fn create_conversation(&self) -> ConversationId {
        let mut state = self.state.write().unwrap();
        let conversation = Conversation::new();
        let id = conversation.id();
        state.conversations.insert(0, conversation);
        state.current_id = Some(id);
        state.composer = ComposerState::default();
        tracing::debug!(conversation_id = %id, "conversation created");
        id
    }

    /// Selects an existing conversation and leaves edit mode.
    pub fn select_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.conversation(id)?;
        state.current_id = Some(id);
        state.composer.editing_message_id = None;
        Ok(())
    }

    /// Deletes a conversation. The list is never left empty: deleting the
    /// last conversation recreates a fresh default, and deleting the selected
    /// one moves the selection to the first remaining conversation.
    pub fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.conversation(id)?;
        state.conversations.retain(|c| c.id() != id);
        state.ensure_selection();
        tracing::debug!(conversation_id = %id, "conversation deleted");
        Ok(())
    }

    /// Flips the pinned flag of a conversation.
    pub fn toggle_pin(&self, id: ConversationId) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.conversation_mut(id)?.toggle_pin();
        Ok(())
    }

    /// Renames a conversation. A renamed conversation never auto-titles.
    pub fn rename_conversation(
        &self,
        id: ConversationId,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.conversation_mut(id)?.rename(title);
        Ok(())
    }

    // ---- search --------------------------------------------------------

    /// Sets the sidebar search query.
    pub fn set_search_query(&self, query: impl Into<String>) {
        self.state.write().unwrap().search_query = query.into();
    }

    pub fn search_query(&self) -> String {
        self.state.read().unwrap().search_query.clone()
    }

    /// Conversations matching the search query, pinned ones first. Matching
    /// is a case-insensitive substring test on the title; relative order
    /// within the pinned and unpinned groups is preserved.
    pub fn filtered_conversations(&self) -> Vec<Conversation> {
        let state = self.state.read().unwrap();
        let needle = state.search_query.to_lowercase();
        let matches: Vec<&Conversation> = state
            .conversations
            .iter()
            .filter(|c| needle.is_empty() || c.title().to_lowercase().contains(&needle))
            .collect();

        let mut ordered: Vec<Conversation> =
            matches.iter().filter(|c| c.pinned()).map(|c| (*c).clone()).collect();
        ordered.extend(matches.iter().filter(|c| !c.pinned()).map(|c| (*c).clone()));
        ordered
    }

    // ---- composer --------------------------------------------------------

    /// Replaces the composer draft.
    pub fn set_composer_input(&self, input: impl Into<String>) {
        self.state.write().unwrap().composer.input = input.into();
    }

    /// Enters edit mode for a message in the current conversation, loading
    /// its content into the composer.
    pub fn start_editing(&self, message_id: MessageId) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        let current = state.current_id.ok_or(StoreError::MessageNotFound(message_id))?;
        let content = state
            .conversation(current)?
            .find_message(message_id)
            .ok_or(StoreError::MessageNotFound(message_id))?
            .content()
            .to_string();
        state.composer.input = content;
        state.composer.editing_message_id = Some(message_id);
        Ok(())
    }

    /// Leaves edit mode and clears the draft.
    pub fn cancel_editing(&self) {
        self.state.write().unwrap().composer = ComposerState::default();
    }

    // ---- settings --------------------------------------------------------

    /// Sets the sampling temperature, clamped to [0, 2].
    pub fn set_temperature(&self, temperature: f32) {
        let mut state = self.state.write().unwrap();
        state.settings.temperature = temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);
    }

    /// Sets the completion token budget, clamped to [16, 4096].
    pub fn set_max_tokens(&self, max_tokens: u32) {
        let mut state = self.state.write().unwrap();
        state.settings.max_tokens = max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS);
    }

    /// Sets the upstream model identifier.
    pub fn set_model(&self, model: impl Into<String>) {
        self.state.write().unwrap().settings.model = model.into();
    }

    // ---- message mutation -------------------------------------------

    /// Appends a message to a conversation.
    pub fn add_message(
        &self,
        conversation_id: ConversationId,
        message: Message,
    ) -> Result<MessageId, StoreError> {
        let mut state = self.state.write().unwrap();
        let id = message.id();
        state.conversation_mut(conversation_id)?.push_message(message);
        Ok(id)
    }

    /// Replaces a message's content. Used while streaming accumulates
    /// assistant output; the caller passes the full running text, not a
    /// delta.
    pub fn update_message_content(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state
            .conversation_mut(conversation_id)?
            .find_message_mut(message_id)
            .ok_or(StoreError::MessageNotFound(message_id))?
            .set_content(content);
        Ok(())
    }

    /// Attaches a stream failure to a message. Content accumulated before
    /// the failure is kept.
    pub fn mark_message_error(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        error: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state
            .conversation_mut(conversation_id)?
            .find_message_mut(message_id)
            .ok_or(StoreError::MessageNotFound(message_id))?
            .set_error(error);
        Ok(())
    }

    /// Removes a single message from a conversation.
    pub fn delete_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if !state.conversation_mut(conversation_id)?.remove_message(message_id) {
            return Err(StoreError::MessageNotFound(message_id));
        }
        Ok(())
    }

    /// Records the usage summary for a conversation's latest exchange.
    pub fn set_usage(
        &self,
        conversation_id: ConversationId,
        usage: TokenUsage,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        state.conversation_mut(conversation_id)?.set_usage(usage);
        Ok(())
    }

    // ---- streaming lifecycle ------------------------------------------

    /// Marks a stream as in flight. Fails if one already is; only a single
    /// stream may run at a time.
    pub fn start_streaming(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        cancel: CancellationToken,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if state.streaming.is_some() {
            return Err(StoreError::StreamInFlight);
        }
        state.streaming = Some(StreamingState {
            conversation_id,
            message_id,
            cancel,
        });
        Ok(())
    }

    /// Clears the in-flight stream, triggering its cancellation token.
    /// Idempotent; safe to call whether the stream finished or was aborted.
    pub fn stop_streaming(&self) {
        let mut state = self.state.write().unwrap();
        if let Some(streaming) = state.streaming.take() {
            streaming.cancel.cancel();
        }
    }

    /// True while a stream is in flight. Sending, editing submission, and
    /// regeneration are rejected while locked.
    pub fn is_locked(&self) -> bool {
        self.state.read().unwrap().streaming.is_some()
    }

    /// The conversation and placeholder the in-flight stream writes to.
    pub fn streaming_target(&self) -> Option<(ConversationId, MessageId)> {
        self.state
            .read()
            .unwrap()
            .streaming
            .as_ref()
            .map(|s| (s.conversation_id, s.message_id))
    }

    // ---- readers ---------------------------------------------------------

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.read().unwrap().conversations.clone()
    }

    pub fn conversation(&self, id: ConversationId) -> Result<Conversation, StoreError> {
        Ok(self.state.read().unwrap().conversation(id)?.clone())
    }

    pub fn current_id(&self) -> Option<ConversationId> {
        self.state.read().unwrap().current_id
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        let state = self.state.read().unwrap();
        state.current_id.and_then(|id| state.conversation(id).ok().cloned())
    }

    pub fn settings(&self) -> ChatSettings {
        self.state.read().unwrap().settings.clone()
    }

    pub fn composer(&self) -> ComposerState {
        self.state.read().unwrap().composer.clone()
    }

    // ---- compound operations ------------------------------------------

    /// Stages the user's message for a send, atomically.
    ///
    /// In edit mode the edited message keeps its id and timestamp but takes
    /// the new content, and everything after it is truncated so the
    /// conversation replays from that point. Otherwise a new user message is
    /// appended. Either way the conversation may take its auto-title from
    /// the content and the composer is reset.
    pub fn stage_user_message(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> Result<MessageId, StoreError> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(StoreError::EmptyContent);
        }

        self.state
            .write()
            .unwrap()
            .stage_user_message(conversation_id, trimmed.to_string())
    }

    /// Begins a send as one atomic transition: rejects while a stream is in
    /// flight, stages the user message, appends the assistant placeholder,
    /// builds the outgoing request, and takes the stream lock. A rejected
    /// begin performs no mutation, so a concurrent send can never leave a
    /// staged message or placeholder behind.
    pub fn begin_send(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<(MessageId, ChatStreamRequest), StoreError> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(StoreError::EmptyContent);
        }

        let mut state = self.state.write().unwrap();
        if state.streaming.is_some() {
            return Err(StoreError::StreamInFlight);
        }

        state.stage_user_message(conversation_id, trimmed.to_string())?;
        let placeholder = Message::assistant_placeholder();
        let message_id = placeholder.id();
        state
            .conversation_mut(conversation_id)?
            .push_message(placeholder);
        let request = state.request_payload(conversation_id)?;
        state.streaming = Some(StreamingState {
            conversation_id,
            message_id,
            cancel,
        });
        Ok((message_id, request))
    }

    /// Appends an empty assistant placeholder for the stream to fill.
    pub fn append_assistant_placeholder(
        &self,
        conversation_id: ConversationId,
    ) -> Result<MessageId, StoreError> {
        let mut state = self.state.write().unwrap();
        let message = Message::assistant_placeholder();
        let id = message.id();
        state.conversation_mut(conversation_id)?.push_message(message);
        Ok(id)
    }

    /// Builds the stream request for a conversation from its history and the
    /// current settings. Empty assistant turns are excluded.
    pub fn request_payload(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ChatStreamRequest, StoreError> {
        self.state.read().unwrap().request_payload(conversation_id)
    }

    /// Prepares a regenerate: finds the nearest user message at or before
    /// the given message, rewinds the history to end with it, and enters
    /// edit mode on it. The replayed send then replaces it in place, keeping
    /// its id and timestamp, so the outgoing request matches the original.
    ///
    /// Rejected while a stream is in flight, before any mutation.
    pub fn truncate_for_regenerate(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(MessageId, String), StoreError> {
        let mut state = self.state.write().unwrap();
        if state.streaming.is_some() {
            return Err(StoreError::StreamInFlight);
        }
        let conversation = state.conversation_mut(conversation_id)?;
        let index = conversation
            .message_index(message_id)
            .ok_or(StoreError::MessageNotFound(message_id))?;

        let (user_index, user_id, user_content) = conversation.messages()[..=index]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.role() == Role::User)
            .map(|(i, m)| (i, m.id(), m.content().to_string()))
            .ok_or(StoreError::NoUserMessage)?;

        conversation.truncate_at(user_index + 1);
        state.composer.input = user_content.clone();
        state.composer.editing_message_id = Some(user_id);
        Ok((user_id, user_content))
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}
