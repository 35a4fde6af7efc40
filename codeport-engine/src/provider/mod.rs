//! # LLM Provider Interface
//!
//! A trait-based abstraction over the two chat-completion backends that can
//! translate code: OpenAI (GPT) and Anthropic (Claude).
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - `Provider` is the closed set of backends the user picks from
//! - Streaming via `StreamReceiver`, consumed until exhausted
//! - SSE framing is parsed by plain structs so it can be tested offline

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;

use crate::error::{Error, ErrorKind, Result};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Split out the system message; Anthropic carries it outside `messages`.
    pub(crate) fn split_system(&self) -> (Option<String>, Vec<&ChatMessage>) {
        let mut system = None;
        let mut rest = Vec::new();
        for msg in &self.messages {
            if msg.role == Role::System {
                system = Some(msg.content.clone());
            } else {
                rest.push(msg);
            }
        }
        (system, rest)
    }
}

/// Response from a non-streaming completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub(crate) fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }

    pub(crate) fn from_anthropic(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            _ => FinishReason::Unknown,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A streaming chunk from the model
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Stream finished
    Done {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    /// Error reported in-band by the provider or the transport
    Error(String),
}

// ============================================================================
// Provider Errors
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Authentication failed
    AuthenticationFailed,
    /// Other error
    Other(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Classify an HTTP failure status the same way for every backend.
    pub(crate) fn from_status(status: u16, body: String, retry_after: Option<u64>) -> Self {
        match status {
            401 | 403 => ProviderError::AuthenticationFailed,
            429 => ProviderError::RateLimited { retry_after },
            _ => ProviderError::Api {
                status,
                message: body,
            },
        }
    }

    /// Wrap into the unified error, keeping the provider name as context.
    pub fn into_error(self, provider: &str, operation: &'static str) -> Error {
        let kind = match &self {
            ProviderError::Network(_) => ErrorKind::NetworkFailed,
            ProviderError::Api { status, .. } if *status >= 500 => ErrorKind::ProviderUnavailable,
            ProviderError::Api { .. } | ProviderError::Other(_) => ErrorKind::InferenceFailed,
            ProviderError::Parse(_) => ErrorKind::ParseFailed,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
        };
        Error::new(kind, self.to_string())
            .with_operation(operation)
            .with_context("provider", provider.to_string())
            .set_source(self)
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Get the models this provider is known to serve
    fn models(&self) -> Vec<String>;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest)
        -> std::result::Result<CompletionResponse, ProviderError>;

    /// Send a completion request and stream the response
    async fn stream(&self, request: CompletionRequest)
        -> std::result::Result<StreamReceiver, ProviderError>;
}

/// Receiver for streaming responses
pub struct StreamReceiver {
    inner: Pin<Box<dyn futures_core::Stream<Item = StreamChunk> + Send>>,
}

impl StreamReceiver {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = StreamChunk> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Build a receiver over a fixed list of chunks
    pub fn from_chunks(chunks: Vec<StreamChunk>) -> Self {
        Self::new(futures_util::stream::iter(chunks))
    }

    /// Wait for the next chunk; `None` once the stream is exhausted
    pub async fn next(&mut self) -> Option<StreamChunk> {
        self.inner.next().await
    }

    /// Collect all text chunks into a single string
    pub async fn collect_text(mut self) -> std::result::Result<String, ProviderError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            match chunk {
                StreamChunk::Text(t) => text.push_str(&t),
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => return Err(ProviderError::Other(e)),
            }
        }
        Ok(text)
    }
}

// ============================================================================
// Model selection
// ============================================================================

/// Which frontier model translates the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    Gpt,
    Claude,
}

impl ModelChoice {
    pub const ALL: [ModelChoice; 2] = [ModelChoice::Gpt, ModelChoice::Claude];

    pub fn label(&self) -> &'static str {
        match self {
            ModelChoice::Gpt => "GPT",
            ModelChoice::Claude => "Claude",
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            ModelChoice::Gpt => ProviderType::OpenAI,
            ModelChoice::Claude => ProviderType::Anthropic,
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpt" | "openai" => Ok(ModelChoice::Gpt),
            "claude" | "anthropic" => Ok(ModelChoice::Claude),
            other => Err(Error::invalid_argument(format!(
                "unknown model '{}', expected 'gpt' or 'claude'",
                other
            ))
            .with_context("model", other.to_string())),
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAI,
    Anthropic,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some(OPENAI_DEFAULT_MODEL.into()),
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), "2023-06-01".into());

        Self {
            provider_type: ProviderType::Anthropic,
            api_key: Some(api_key.into()),
            base_url: Some("https://api.anthropic.com/v1".into()),
            default_model: Some(ANTHROPIC_DEFAULT_MODEL.into()),
            headers,
            timeout_secs: Some(120),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

pub(crate) fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
        .build()
        .map_err(|e| {
            Error::new(ErrorKind::ProviderUnavailable, "failed to create HTTP client")
                .with_operation("provider::http_client")
                .set_source(e)
        })
}

pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

// ============================================================================
// Provider selection
// ============================================================================

/// One of the two backends, chosen at runtime from a [`ModelChoice`].
pub enum Provider {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl Provider {
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        Ok(match config.provider_type {
            ProviderType::OpenAI => Provider::OpenAI(OpenAIProvider::new(config)?),
            ProviderType::Anthropic => Provider::Anthropic(AnthropicProvider::new(config)?),
        })
    }
}

impl LlmProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.name(),
            Provider::Anthropic(p) => p.name(),
        }
    }

    fn models(&self) -> Vec<String> {
        match self {
            Provider::OpenAI(p) => p.models(),
            Provider::Anthropic(p) => p.models(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            Provider::OpenAI(p) => p.default_model(),
            Provider::Anthropic(p) => p.default_model(),
        }
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        match self {
            Provider::OpenAI(p) => p.complete(request).await,
            Provider::Anthropic(p) => p.complete(request).await,
        }
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<StreamReceiver, ProviderError> {
        match self {
            Provider::OpenAI(p) => p.stream(request).await,
            Provider::Anthropic(p) => p.stream(request).await,
        }
    }
}

// ============================================================================
// SSE framing
// ============================================================================

/// Splits a byte stream into complete server-sent events.
///
/// Events are separated by a blank line; carriage returns are dropped so
/// `\r\n` framed servers parse the same way.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    /// Append raw bytes and return every complete event.
    ///
    /// Events are split on bytes so a UTF-8 character cut by a chunk
    /// boundary is decoded only once both halves have arrived.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend(bytes.iter().filter(|&&b| b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.buffer.drain(..pos + 2).take(pos).collect();
            events.push(String::from_utf8_lossy(&event).into_owned());
        }
        events
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are helpful");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content, "You are helpful");

        let user = ChatMessage::user("Hello");
        assert_eq!(user.role, Role::User);

        let asst = ChatMessage::assistant("Hi there!");
        assert_eq!(asst.role, Role::Assistant);
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Hello")])
            .with_model("gpt-4o")
            .with_temperature(0.7)
            .with_max_tokens(1000);

        assert_eq!(request.model, Some("gpt-4o".into()));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[test]
    fn test_split_system() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("code"),
        ]);
        let (system, rest) = request.split_system();
        assert_eq!(system.as_deref(), Some("sys"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, Role::User);
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::openai("sk-test");
        assert_eq!(config.provider_type, ProviderType::OpenAI);
        assert_eq!(config.default_model.as_deref(), Some(OPENAI_DEFAULT_MODEL));

        let config = ProviderConfig::anthropic("sk-ant-test").with_model("claude-3-opus-20240229");
        assert_eq!(config.provider_type, ProviderType::Anthropic);
        assert!(config.headers.contains_key("anthropic-version"));
        assert_eq!(config.default_model.as_deref(), Some("claude-3-opus-20240229"));
    }

    #[test]
    fn test_model_choice_parsing() {
        assert_eq!("GPT".parse::<ModelChoice>().unwrap(), ModelChoice::Gpt);
        assert_eq!("openai".parse::<ModelChoice>().unwrap(), ModelChoice::Gpt);
        assert_eq!(" Claude ".parse::<ModelChoice>().unwrap(), ModelChoice::Claude);
        assert_eq!("anthropic".parse::<ModelChoice>().unwrap(), ModelChoice::Claude);

        let err = "llama".parse::<ModelChoice>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_provider_error_classification() {
        let err = ProviderError::from_status(401, String::new(), None);
        assert!(matches!(err, ProviderError::AuthenticationFailed));

        let err = ProviderError::from_status(429, String::new(), Some(7));
        assert!(matches!(err, ProviderError::RateLimited { retry_after: Some(7) }));
        assert_eq!(err.to_string(), "Rate limited (retry after 7s)");

        let err = ProviderError::from_status(503, "overloaded".into(), None)
            .into_error("anthropic", "provider::stream");
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(err.context()[0], ("provider", "anthropic".to_string()));
    }

    #[test]
    fn test_sse_buffer_splits_partial_events() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b"data: {\"a\":").is_empty());

        let events = sse.push(b"1}\r\n\r\ndata: [DONE]\n\n");
        assert_eq!(events, vec!["data: {\"a\":1}".to_string(), "data: [DONE]".to_string()]);
    }

    #[test]
    fn test_sse_buffer_keeps_split_utf8() {
        let event = "data: // π ≈ 3.14 µs\n\n".as_bytes();
        let cut = event.iter().position(|&b| b == 0xCF).unwrap() + 1;

        let mut sse = SseBuffer::default();
        assert!(sse.push(&event[..cut]).is_empty());
        assert_eq!(sse.push(&event[cut..]), vec!["data: // π ≈ 3.14 µs".to_string()]);
    }

    #[tokio::test]
    async fn test_collect_text_stops_at_done() {
        let receiver = StreamReceiver::from_chunks(vec![
            StreamChunk::Text("int ".into()),
            StreamChunk::Text("main()".into()),
            StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: None,
            },
            StreamChunk::Text("ignored".into()),
        ]);
        assert_eq!(receiver.collect_text().await.unwrap(), "int main()");
    }

    #[tokio::test]
    async fn test_collect_text_surfaces_errors() {
        let receiver = StreamReceiver::from_chunks(vec![
            StreamChunk::Text("partial".into()),
            StreamChunk::Error("connection reset".into()),
        ]);
        let err = receiver.collect_text().await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }
}
