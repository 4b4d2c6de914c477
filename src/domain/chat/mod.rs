//! Chat domain: conversations, messages, usage accounting, and settings.
//!
//! These entities are owned exclusively by the chat store
//! ([`crate::application::ChatStore`]); all mutation goes through it.

mod conversation;
mod message;
mod settings;
mod timestamp;
mod usage;

pub use conversation::{Conversation, ConversationId, AUTO_TITLE_LEN, DEFAULT_TITLE};
pub use message::{Message, MessageId, Role};
pub use settings::{
    ChatSettings, MAX_MAX_TOKENS, MAX_TEMPERATURE, MIN_MAX_TOKENS, MIN_TEMPERATURE,
};
pub use timestamp::Timestamp;
pub use usage::TokenUsage;
