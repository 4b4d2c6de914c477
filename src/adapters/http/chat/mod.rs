//! Chat relay HTTP adapter.

mod dto;
mod handlers;
mod routes;

pub use dto::{ChatRequest, ValidationErrors, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
pub use handlers::{chat_stream, relay_events, ChatAppState};
pub use routes::chat_router;
