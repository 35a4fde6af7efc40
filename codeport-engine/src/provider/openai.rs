//! OpenAI chat-completions provider
//!
//! Also works against OpenAI-compatible servers when `base_url` points elsewhere.

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.openai.com/v1")
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OpenAIRequest {
        let model = request.model.as_deref().unwrap_or(self.default_model());
        OpenAIRequest {
            model: model.to_string(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(stream),
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    async fn send(
        &self,
        body: &OpenAIRequest,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(body);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        tracing::debug!(model = %body.model, stream = ?body.stream, "openai request");

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry = retry_after(&response);
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, text, retry));
        }

        Ok(response)
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "gpt-4o".into(),
            "gpt-4o-mini".into(),
            "gpt-4-turbo".into(),
            "gpt-4".into(),
        ]
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL)
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let body = self.build_request(&request, false);
        let response = self.send(&body).await?;

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("No choices in response".into()))?;

        let usage = api_response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_openai)
                .unwrap_or(FinishReason::Unknown),
            usage,
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<StreamReceiver, ProviderError> {
        let body = self.build_request(&request, true);
        let response = self.send(&body).await?;

        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut sse = SseBuffer::default();
            let mut parser = OpenAIStreamParser::default();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for event in sse.push(&bytes) {
                            for chunk in parser.parse_event(&event) {
                                let done = matches!(chunk, StreamChunk::Done { .. });
                                yield chunk;
                                if done {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                }
            }

            // Server closed without [DONE]; report what we have.
            yield parser.finish();
        };

        Ok(StreamReceiver::new(stream))
    }
}

// ============================================================================
// Stream parsing
// ============================================================================

/// Turns OpenAI SSE events into [`StreamChunk`]s.
///
/// The finish reason and the usage arrive in separate frames before
/// `[DONE]`, so both are held until the terminator.
#[derive(Debug, Default)]
pub(crate) struct OpenAIStreamParser {
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl OpenAIStreamParser {
    pub(crate) fn parse_event(&mut self, event: &str) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        for line in event.lines() {
            let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                continue;
            };

            if data == "[DONE]" {
                self.finish_reason.get_or_insert(FinishReason::Stop);
                chunks.push(self.finish());
                break;
            }

            match serde_json::from_str::<OpenAIStreamChunk>(data) {
                Ok(frame) => {
                    if let Some(error) = frame.error {
                        chunks.push(StreamChunk::Error(error.message));
                        continue;
                    }
                    if let Some(u) = frame.usage {
                        self.usage = Some(Usage::new(u.prompt_tokens, u.completion_tokens));
                    }
                    for choice in frame.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                chunks.push(StreamChunk::Text(content));
                            }
                        }
                        if let Some(reason) = choice.finish_reason {
                            self.finish_reason = Some(FinishReason::from_openai(&reason));
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed openai frame"),
            }
        }
        chunks
    }

    /// Without a reported finish reason the reply ended early, so it is `Unknown`.
    pub(crate) fn finish(&mut self) -> StreamChunk {
        StreamChunk::Done {
            finish_reason: self.finish_reason.take().unwrap_or(FinishReason::Unknown),
            usage: self.usage.take(),
        }
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().into(),
            content: Some(msg.content.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    id: String,
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
    error: Option<OpenAIErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let provider = OpenAIProvider::new(ProviderConfig::openai("sk-test")).unwrap();
        let request = CompletionRequest::new(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("print(1)"),
        ]);

        let body = serde_json::to_value(provider.build_request(&request, true)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "print(1)");
        assert!(body.get("temperature").is_none());

        let body = serde_json::to_value(provider.build_request(&request, false)).unwrap();
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_parse_text_deltas_and_done() {
        let mut parser = OpenAIStreamParser::default();

        let chunks = parser.parse_event(
            r#"data: {"choices":[{"delta":{"role":"assistant","content":"```cpp\n"},"finish_reason":null}]}"#,
        );
        assert_eq!(chunks, vec![StreamChunk::Text("```cpp\n".into())]);

        let chunks = parser.parse_event(
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        );
        assert!(chunks.is_empty());

        let chunks = parser.parse_event(
            r#"data: {"choices":[],"usage":{"prompt_tokens":120,"completion_tokens":30,"total_tokens":150}}"#,
        );
        assert!(chunks.is_empty());

        let chunks = parser.parse_event("data: [DONE]");
        assert_eq!(
            chunks,
            vec![StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: Some(Usage::new(120, 30)),
            }]
        );
    }

    #[test]
    fn test_parse_length_finish() {
        let mut parser = OpenAIStreamParser::default();
        parser.parse_event(r#"data: {"choices":[{"delta":{},"finish_reason":"length"}]}"#);
        let chunks = parser.parse_event("data: [DONE]");
        assert!(matches!(
            chunks[0],
            StreamChunk::Done { finish_reason: FinishReason::Length, usage: None }
        ));
    }

    #[test]
    fn test_parse_error_frame_and_garbage() {
        let mut parser = OpenAIStreamParser::default();
        assert!(parser.parse_event("data: not json").is_empty());
        assert!(parser.parse_event(": keep-alive").is_empty());

        let chunks = parser.parse_event(r#"data: {"error":{"message":"model overloaded"}}"#);
        assert_eq!(chunks, vec![StreamChunk::Error("model overloaded".into())]);
    }

    #[test]
    fn test_closed_without_done_is_unknown() {
        let mut parser = OpenAIStreamParser::default();
        let chunks = parser.parse_event(r#"data: {"choices":[{"delta":{"content":"int main() {"}}]}"#);
        assert_eq!(chunks, vec![StreamChunk::Text("int main() {".into())]);
        assert_eq!(
            parser.finish(),
            StreamChunk::Done { finish_reason: FinishReason::Unknown, usage: None }
        );
    }

    #[test]
    fn test_done_without_finish_reason_is_stop() {
        let mut parser = OpenAIStreamParser::default();
        assert!(matches!(
            parser.parse_event("data: [DONE]")[0],
            StreamChunk::Done { finish_reason: FinishReason::Stop, .. }
        ));
    }
}
