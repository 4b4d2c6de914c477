//! Chat orchestrator - drives a send through the stream source and applies
//! every event to the store.
//!
//! A send begins with one atomic store transition (stage the user message,
//! append an assistant placeholder, take the stream lock), then opens the
//! stream and folds events into the placeholder. The lock is always released
//! on exit, whatever the stream did, so a failed or cancelled send never
//! wedges the store.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::application::store::{ChatStore, StoreError};
use crate::domain::chat::{ConversationId, MessageId};
use crate::ports::{ChatStreamSource, StreamEvent};

/// Error shown on the assistant message when the stream could not be opened.
const CONNECTION_FAILED: &str = "connection to the server failed";

/// Fallback shown when the stream reports an error without a message.
const STREAM_FAILED: &str = "the response stream failed";

/// Coordinates the store and the stream source for a full send cycle.
pub struct ChatOrchestrator {
    store: Arc<ChatStore>,
    source: Arc<dyn ChatStreamSource>,
}

impl ChatOrchestrator {
    pub fn new(store: Arc<ChatStore>, source: Arc<dyn ChatStreamSource>) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    /// Sends a message in a conversation and streams the reply into a new
    /// assistant message.
    ///
    /// Returns once the stream has ended, failed, or been cancelled. Content
    /// accumulated before a failure or cancellation stays in the message;
    /// cancellation records no error.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> Result<(), StoreError> {
        let cancel = CancellationToken::new();
        let (message_id, request) =
            self.store
                .begin_send(conversation_id, content, cancel.clone())?;

        let outcome = self
            .run_stream(conversation_id, message_id, request, cancel)
            .await;
        self.store.stop_streaming();
        outcome
    }

    /// Regenerates the reply for a message: rewinds the conversation to the
    /// nearest preceding user message and replays it.
    pub async fn regenerate_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> Result<(), StoreError> {
        let (_, content) = self
            .store
            .truncate_for_regenerate(conversation_id, message_id)?;
        self.send_message(conversation_id, content).await
    }

    /// Aborts the in-flight stream, if any. The partial reply stays as-is.
    pub fn cancel_streaming(&self) {
        self.store.stop_streaming();
    }

    async fn run_stream(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        request: crate::ports::ChatStreamRequest,
        cancel: CancellationToken,
    ) -> Result<(), StoreError> {
        let mut events = match self.source.open(request, cancel).await {
            Ok(events) => events,
            Err(err) => {
                tracing::error!(error = %err, "failed to open chat stream");
                self.store
                    .mark_message_error(conversation_id, message_id, CONNECTION_FAILED)?;
                return Ok(());
            }
        };

        let mut accumulated = String::new();
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Token { content: Some(content) } if !content.is_empty() => {
                    accumulated.push_str(&content);
                    self.store.update_message_content(
                        conversation_id,
                        message_id,
                        accumulated.clone(),
                    )?;
                }
                StreamEvent::Token { .. } => {}
                StreamEvent::Usage { usage } => {
                    self.store.set_usage(conversation_id, usage)?;
                }
                StreamEvent::Error { message } => {
                    let message = message.unwrap_or_else(|| STREAM_FAILED.to_string());
                    tracing::warn!(error = %message, "stream reported an error");
                    self.store
                        .mark_message_error(conversation_id, message_id, message)?;
                }
                StreamEvent::Done => break,
            }
        }
        Ok(())
    }
}
