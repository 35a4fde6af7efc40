//! Anthropic Claude provider implementation

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.anthropic.com/v1")
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let model = request.model.as_deref().unwrap_or(self.default_model());
        let (system, messages) = request.split_system();

        AnthropicRequest {
            model: model.to_string(),
            messages: messages.into_iter().map(AnthropicMessage::from).collect(),
            system,
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
            stream: Some(stream),
        }
    }

    async fn send(
        &self,
        body: &AnthropicRequest,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::AuthenticationFailed)?;

        let mut req = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .header("content-type", "application/json")
            .json(body);

        if !self.config.headers.contains_key("anthropic-version") {
            req = req.header("anthropic-version", ANTHROPIC_VERSION);
        }
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        tracing::debug!(model = %body.model, stream = ?body.stream, "anthropic request");

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

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-3-5-sonnet-20240620".into(),
            "claude-3-opus-20240229".into(),
            "claude-3-haiku-20240307".into(),
        ]
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or(ANTHROPIC_DEFAULT_MODEL)
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let body = self.build_request(&request, false);
        let response = self.send(&body).await?;

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content: String = api_response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            finish_reason: api_response
                .stop_reason
                .as_deref()
                .map(FinishReason::from_anthropic)
                .unwrap_or(FinishReason::Unknown),
            usage: Usage::new(api_response.usage.input_tokens, api_response.usage.output_tokens),
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
            let mut parser = AnthropicStreamParser::default();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for event in sse.push(&bytes) {
                            if let Some(chunk) = parser.parse_event(&event) {
                                let terminal = matches!(
                                    chunk,
                                    StreamChunk::Done { .. } | StreamChunk::Error(_)
                                );
                                yield chunk;
                                if terminal {
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

            yield parser.finish();
        };

        Ok(StreamReceiver::new(stream))
    }
}

// ============================================================================
// Stream parsing
// ============================================================================

/// Turns Anthropic SSE events into [`StreamChunk`]s.
///
/// Input tokens come with `message_start`, output tokens and the stop
/// reason with `message_delta`; both are reported on `message_stop`.
#[derive(Debug, Default)]
pub(crate) struct AnthropicStreamParser {
    input_tokens: usize,
    output_tokens: usize,
    finish_reason: Option<FinishReason>,
}

impl AnthropicStreamParser {
    pub(crate) fn parse_event(&mut self, event: &str) -> Option<StreamChunk> {
        let mut event_type = None;
        let mut event_data = None;

        for line in event.lines() {
            if let Some(t) = line.strip_prefix("event:") {
                event_type = Some(t.trim());
            } else if let Some(d) = line.strip_prefix("data:") {
                event_data = Some(d.trim_start());
            }
        }

        let (etype, data) = (event_type?, event_data?);
        match etype {
            "message_start" => {
                if let Ok(start) = serde_json::from_str::<MessageStart>(data) {
                    self.input_tokens = start.message.usage.input_tokens;
                }
                None
            }
            "content_block_delta" => match serde_json::from_str::<ContentBlockDelta>(data) {
                Ok(ContentBlockDelta {
                    delta: DeltaContent::TextDelta { text },
                }) => Some(StreamChunk::Text(text)),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed anthropic delta");
                    None
                }
            },
            "message_delta" => {
                if let Ok(delta) = serde_json::from_str::<MessageDelta>(data) {
                    if let Some(reason) = delta.delta.stop_reason {
                        self.finish_reason = Some(FinishReason::from_anthropic(&reason));
                    }
                    if let Some(usage) = delta.usage {
                        self.output_tokens = usage.output_tokens;
                    }
                }
                None
            }
            "message_stop" => {
                self.finish_reason.get_or_insert(FinishReason::Stop);
                Some(self.finish())
            }
            "error" => {
                let message = serde_json::from_str::<StreamError>(data)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| data.to_string());
                Some(StreamChunk::Error(message))
            }
            _ => None,
        }
    }

    /// Without a stop reason the stream was cut off, so it is `Unknown`.
    pub(crate) fn finish(&mut self) -> StreamChunk {
        StreamChunk::Done {
            finish_reason: self.finish_reason.take().unwrap_or(FinishReason::Unknown),
            usage: Some(Usage::new(self.input_tokens, self.output_tokens)),
        }
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

impl From<&ChatMessage> for AnthropicMessage {
    fn from(msg: &ChatMessage) -> Self {
        let role = match msg.role {
            Role::Assistant => "assistant",
            Role::User | Role::System => "user",
        };
        Self {
            role,
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

// Streaming types
#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: DeltaContent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum DeltaContent {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<DeltaUsage>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    error: StreamErrorBody,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_moves_to_top_level() {
        let provider = AnthropicProvider::new(ProviderConfig::anthropic("sk-ant")).unwrap();
        let request = CompletionRequest::new(vec![
            ChatMessage::system("reimplement in C++"),
            ChatMessage::user("print(42)"),
        ]);

        let body = serde_json::to_value(provider.build_request(&request, true)).unwrap();
        assert_eq!(body["system"], "reimplement in C++");
        assert_eq!(body["model"], ANTHROPIC_DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "print(42)");
    }

    #[test]
    fn test_parse_full_event_sequence() {
        let mut parser = AnthropicStreamParser::default();

        assert!(parser
            .parse_event(
                "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":210,\"output_tokens\":1}}}"
            )
            .is_none());

        assert!(parser
            .parse_event(
                "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}"
            )
            .is_none());

        let chunk = parser.parse_event(
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"#include <iostream>\"}}",
        );
        assert_eq!(chunk, Some(StreamChunk::Text("#include <iostream>".into())));

        assert!(parser
            .parse_event(
                "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":42}}"
            )
            .is_none());

        let done = parser.parse_event("event: message_stop\ndata: {\"type\":\"message_stop\"}");
        assert_eq!(
            done,
            Some(StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: Some(Usage::new(210, 42)),
            })
        );
    }

    #[test]
    fn test_parse_ping_and_error() {
        let mut parser = AnthropicStreamParser::default();
        assert!(parser.parse_event("event: ping\ndata: {\"type\":\"ping\"}").is_none());

        let chunk = parser.parse_event(
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}",
        );
        assert_eq!(chunk, Some(StreamChunk::Error("Overloaded".into())));
    }

    #[test]
    fn test_max_tokens_stop_reason() {
        let mut parser = AnthropicStreamParser::default();
        parser.parse_event(
            "event: message_delta\ndata: {\"delta\":{\"stop_reason\":\"max_tokens\"},\"usage\":{\"output_tokens\":4096}}",
        );
        assert!(matches!(
            parser.finish(),
            StreamChunk::Done { finish_reason: FinishReason::Length, .. }
        ));
    }

    #[test]
    fn test_cut_off_stream_is_unknown() {
        let mut parser = AnthropicStreamParser::default();
        parser.parse_event(
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"int main() {\"}}",
        );
        assert!(matches!(
            parser.finish(),
            StreamChunk::Done { finish_reason: FinishReason::Unknown, .. }
        ));
    }
}
