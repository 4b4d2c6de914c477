//! Mock AI provider for testing.
//!
//! Scripted implementation of the AIProvider port: tests queue chunk
//! sequences, stream failures, or dispatch failures, and inspect the
//! requests the relay actually sent.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::domain::chat::TokenUsage;
use crate::ports::{AIProvider, AiError, ChunkStream, CompletionRequest, StreamChunk};

/// A scripted upstream session.
#[derive(Debug)]
enum MockScript {
    /// Stream these items in order.
    Stream(Vec<Result<StreamChunk, AiError>>),
    /// Fail before any stream opens.
    DispatchError(AiError),
}

/// Mock provider: scripts are consumed in queue order, one per call.
#[derive(Debug, Clone, Default)]
pub struct MockAiProvider {
    scripts: Arc<Mutex<VecDeque<MockScript>>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockAiProvider {
    /// Creates a mock with an empty script queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a single-fragment reply followed by a usage summary.
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        let items = vec![
            Ok(StreamChunk::content(content)),
            Ok(StreamChunk::usage(TokenUsage::new(10, 20))),
        ];
        self.push_script(MockScript::Stream(items))
    }

    /// Queues a reply streamed as the given fragments, optionally with usage.
    pub fn with_token_chunks(
        self,
        fragments: Vec<&str>,
        usage: Option<TokenUsage>,
    ) -> Self {
        let mut items: Vec<Result<StreamChunk, AiError>> = fragments
            .into_iter()
            .map(|f| Ok(StreamChunk::content(f)))
            .collect();
        if let Some(usage) = usage {
            items.push(Ok(StreamChunk::usage(usage)));
        }
        self.push_script(MockScript::Stream(items))
    }

    /// Queues a stream that yields the given fragments then fails.
    pub fn with_stream_failure(self, fragments: Vec<&str>, error: AiError) -> Self {
        let mut items: Vec<Result<StreamChunk, AiError>> = fragments
            .into_iter()
            .map(|f| Ok(StreamChunk::content(f)))
            .collect();
        items.push(Err(error));
        self.push_script(MockScript::Stream(items))
    }

    /// Queues a failure before any stream opens.
    pub fn with_dispatch_error(self, error: AiError) -> Self {
        self.push_script(MockScript::DispatchError(error))
    }

    fn push_script(self, script: MockScript) -> Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    /// All requests received so far.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// The most recent request, if any.
    pub fn last_call(&self) -> Option<CompletionRequest> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AIProvider for MockAiProvider {
    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream, AiError> {
        self.calls.lock().unwrap().push(request);

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(MockScript::Stream(items)) => Ok(Box::pin(stream::iter(items))),
            Some(MockScript::DispatchError(err)) => Err(err),
            None => Err(AiError::unavailable("no scripted response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MessageRole;
    use futures::StreamExt;

    #[tokio::test]
    async fn scripted_reply_streams_in_order() {
        let provider = MockAiProvider::new().with_token_chunks(
            vec!["Hel", "lo"],
            Some(TokenUsage::new(5, 2)),
        );

        let request = CompletionRequest::new(0.7, 1024).with_message(MessageRole::User, "hi");
        let mut stream = provider.stream_complete(request).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delta, "Hel");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.delta, "lo");
        let last = stream.next().await.unwrap().unwrap();
        assert_eq!(last.usage, Some(TokenUsage::new(5, 2)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn records_requests() {
        let provider = MockAiProvider::new().with_reply("ok");
        let request = CompletionRequest::new(0.5, 64).with_message(MessageRole::User, "ping");
        let _ = provider.stream_complete(request.clone()).await.unwrap();

        assert_eq!(provider.calls().len(), 1);
        assert_eq!(provider.last_call(), Some(request));
    }

    #[tokio::test]
    async fn dispatch_error_fails_the_call() {
        let provider =
            MockAiProvider::new().with_dispatch_error(AiError::unavailable("down for maintenance"));
        let request = CompletionRequest::new(0.7, 1024);
        assert!(provider.stream_complete(request).await.is_err());
    }

    #[tokio::test]
    async fn exhausted_queue_reports_unavailable() {
        let provider = MockAiProvider::new();
        let result = provider.stream_complete(CompletionRequest::new(0.7, 1024)).await;
        assert!(matches!(result, Err(AiError::Unavailable(_))));
    }
}
