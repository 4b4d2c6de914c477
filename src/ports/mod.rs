//! Ports - interfaces between the core and its adapters.

mod ai_provider;
mod chat_stream;
mod snapshot_store;

pub use ai_provider::{
    AIProvider, AiError, ChatMessage, ChunkStream, CompletionRequest, MessageRole, StreamChunk,
};
pub use chat_stream::{
    ChatStreamError, ChatStreamRequest, ChatStreamSource, EventStream, StreamEvent,
};
pub use snapshot_store::{
    SnapshotError, SnapshotStore, StoreSnapshot, SNAPSHOT_NAME, SNAPSHOT_VERSION,
};
