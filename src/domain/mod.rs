//! Domain layer - entities and value objects for the chat core.

pub mod chat;
