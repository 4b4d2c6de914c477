//! NovaChat - Streaming Chat Relay and Conversation Engine
//!
//! This crate implements a server-push chat relay over an OpenAI-compatible
//! upstream plus the client-side conversation state machine that consumes it.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
