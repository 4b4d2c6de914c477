//! SSE adapters - event-stream client for the relay protocol.

mod client;

pub use client::SseChatClient;
