//! OpenAI provider - implementation of AIProvider for OpenAI-compatible APIs.
//!
//! Opens a streaming chat completion and decodes the provider's SSE wire
//! format into [`StreamChunk`]s. Token deltas are yielded as they arrive and
//! the usage summary is taken from the final data chunk (requested via
//! `stream_options.include_usage`). Single attempt: failures propagate to
//! the caller, retry policy lives nowhere in this system.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use crate::domain::chat::TokenUsage;
use crate::ports::{AIProvider, AiError, ChunkStream, CompletionRequest, MessageRole, StreamChunk};

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Model to request (e.g. "gpt-5-mini").
    pub model: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "gpt-5-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Sets the model to request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// OpenAI-compatible API provider.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    /// Creates a new provider with the given configuration.
    pub fn new(config: OpenAiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn to_wire_request(&self, request: &CompletionRequest) -> WireRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| WireMessage {
                role: match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }
                .to_string(),
                content: msg.content.clone(),
            })
            .collect();

        WireRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> AiError {
        if err.is_timeout() {
            AiError::Timeout {
                timeout_secs: self.config.timeout.as_secs() as u32,
            }
        } else if err.is_connect() {
            AiError::network(format!("connection failed: {err}"))
        } else {
            AiError::network(err.to_string())
        }
    }

    async fn handle_status(response: Response) -> Result<Response, AiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 => Err(AiError::AuthenticationFailed),
            429 => Err(AiError::RateLimited),
            400 => Err(AiError::InvalidRequest(body)),
            500..=599 => Err(AiError::unavailable(format!("server error {status}: {body}"))),
            _ => Err(AiError::network(format!("unexpected status {status}: {body}"))),
        }
    }
}

#[async_trait]
impl AIProvider for OpenAiProvider {
    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream, AiError> {
        let wire_request = self.to_wire_request(&request);

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = Self::handle_status(response).await?;
        tracing::debug!(model = %self.config.model, "upstream stream opened");

        Ok(Box::pin(decode_sse_chunks(Box::pin(
            response.bytes_stream(),
        ))))
    }
}

/// Decodes the provider's SSE byte stream into token/usage fragments.
///
/// Buffers partial lines across network chunks so a `data:` record split
/// between reads is reassembled before parsing.
fn decode_sse_chunks<S, B>(bytes: Pin<Box<S>>) -> impl Stream<Item = Result<StreamChunk, AiError>>
where
    S: Stream<Item = reqwest::Result<B>> + Send + ?Sized,
    B: AsRef<[u8]>,
{
    struct DecodeState<S: ?Sized> {
        bytes: Pin<Box<S>>,
        buffer: String,
        pending: VecDeque<Result<StreamChunk, AiError>>,
        finished: bool,
    }

    let state = DecodeState {
        bytes,
        buffer: String::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));
                    while let Some(pos) = st.buffer.find('\n') {
                        let line: String = st.buffer.drain(..=pos).collect();
                        match parse_sse_line(line.trim_end()) {
                            LineOutcome::Chunks(chunks) => st.pending.extend(chunks),
                            LineOutcome::Done => st.finished = true,
                            LineOutcome::Skip => {}
                        }
                    }
                }
                Some(Err(err)) => {
                    st.pending
                        .push_back(Err(AiError::network(format!("stream error: {err}"))));
                    st.finished = true;
                }
                None => st.finished = true,
            }
        }
    })
}

enum LineOutcome {
    Chunks(Vec<Result<StreamChunk, AiError>>),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> LineOutcome {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return LineOutcome::Skip;
    };
    if data.is_empty() {
        return LineOutcome::Skip;
    }
    if data == "[DONE]" {
        return LineOutcome::Done;
    }

    match serde_json::from_str::<WireStreamChunk>(data) {
        Ok(chunk) => {
            let mut out = Vec::new();
            if let Some(choice) = chunk.choices.first() {
                if let Some(content) = choice.delta.content.as_deref() {
                    if !content.is_empty() {
                        out.push(Ok(StreamChunk::content(content)));
                    }
                }
            }
            if let Some(usage) = chunk.usage {
                out.push(Ok(StreamChunk::usage(TokenUsage::new(
                    usage.prompt_tokens,
                    usage.completion_tokens,
                ))));
            }
            LineOutcome::Chunks(out)
        }
        Err(err) => LineOutcome::Chunks(vec![Err(AiError::parse(format!(
            "failed to parse stream chunk: {err}"
        )))]),
    }
}

// ----- Wire types -----

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks_of(line: &str) -> Vec<Result<StreamChunk, AiError>> {
        match parse_sse_line(line) {
            LineOutcome::Chunks(chunks) => chunks,
            _ => Vec::new(),
        }
    }

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        let chunks = chunks_of(line);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().delta, "Hello");
    }

    #[test]
    fn parses_usage_chunk_with_empty_choices() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":8,"total_tokens":20}}"#;
        let chunks = chunks_of(line);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap().usage,
            Some(TokenUsage::new(12, 8))
        );
    }

    #[test]
    fn done_sentinel_terminates() {
        assert!(matches!(parse_sse_line("data: [DONE]"), LineOutcome::Done));
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(matches!(parse_sse_line(""), LineOutcome::Skip));
        assert!(matches!(parse_sse_line(": keep-alive"), LineOutcome::Skip));
    }

    #[test]
    fn malformed_data_yields_parse_error() {
        let chunks = chunks_of("data: {not json");
        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(AiError::Parse(_))));
    }

    #[test]
    fn empty_delta_is_not_emitted() {
        let line = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert!(chunks_of(line).is_empty());
    }

    #[test]
    fn wire_request_includes_usage_option() {
        let config = OpenAiConfig::new("test-key").with_model("gpt-5-mini");
        let provider = OpenAiProvider::new(config);
        let request = CompletionRequest::new(0.7, 1024).with_message(MessageRole::User, "hi");

        let wire = provider.to_wire_request(&request);
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains(r#""stream":true"#));
        assert!(json.contains(r#""include_usage":true"#));
        assert!(json.contains(r#""model":"gpt-5-mini""#));
    }

    #[test]
    fn config_builder_works() {
        let config = OpenAiConfig::new("key")
            .with_base_url("http://localhost:9999/v1")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "http://localhost:9999/v1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.api_key(), "key");
    }
}
