//! HTTP adapters - the relay's REST/SSE surface.

pub mod chat;

pub use chat::{chat_router, ChatAppState};
