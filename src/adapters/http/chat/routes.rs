//! Axum routes for the chat relay.

use axum::routing::post;
use axum::Router;

use super::handlers::{chat_stream, ChatAppState};

/// Creates the relay router.
///
/// Endpoints:
/// - POST /chat - open a server-push event stream for one completion
pub fn chat_router() -> Router<ChatAppState> {
    Router::new().route("/chat", post(chat_stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_router_builds() {
        let _router = chat_router();
    }
}
