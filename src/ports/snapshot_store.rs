//! Snapshot store port - persistence for the chat store's logical state.
//!
//! The snapshot is a single named, versioned record. On load, if `current_id`
//! is absent or no longer matches a conversation, the store selects the first
//! remaining conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::chat::{ChatSettings, Conversation, ConversationId};

/// Name of the persisted record.
pub const SNAPSHOT_NAME: &str = "novachat-store";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The persisted logical state of the chat store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Format version for forward-compatible loading.
    pub version: u32,
    /// All conversations, in display order.
    pub conversations: Vec<Conversation>,
    /// Selected conversation, if any.
    pub current_id: Option<ConversationId>,
    /// Generation settings.
    pub settings: ChatSettings,
}

/// Errors that can occur during snapshot persistence.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to serialize snapshot: {0}")]
    Serialize(String),

    #[error("failed to deserialize snapshot: {0}")]
    Deserialize(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Port for persisting and restoring the store snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists the snapshot, replacing any previous one.
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), SnapshotError>;

    /// Loads the most recent snapshot, or `None` when nothing was persisted.
    async fn load(&self) -> Result<Option<StoreSnapshot>, SnapshotError>;
}
