//! Direct OpenAI chat-completions backend, full and streaming.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GenerationError, GenerationRequest, Generator, TextStream};

const DEFAULT_MODEL: &str = "gpt-4-1106-preview";
const MAX_TOKENS: u32 = 2000;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url("https://api.openai.com", api_key)
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system_prompt,
                },
                Message {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: MAX_TOKENS,
            stream,
        }
    }

    async fn post(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut builder = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request, stream));
        if stream {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream { status, message });
        }
        Ok(response)
    }
}

/// Extract the text delta from one chat-completions SSE chunk. Chunks that
/// are not JSON or carry no content (role announcements, finish markers)
/// yield nothing.
fn extract_delta(data: &str) -> Option<String> {
    let chunk: serde_json::Value = serde_json::from_str(data).ok()?;
    chunk
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decode a chat-completions `text/event-stream` body into text deltas,
/// terminating on the literal `[DONE]` sentinel.
fn decode_chat_sse<S, B, E>(stream: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    stream
        .eventsource()
        .map_err(|e| GenerationError::Stream(e.to_string()))
        .try_take_while(|event| future::ready(Ok(event.data.trim() != "[DONE]")))
        .try_filter_map(|event| future::ready(Ok(extract_delta(&event.data))))
}

#[async_trait]
impl Generator for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        request.validate()?;
        let response = self.post(request, false).await?;
        let parsed = response.json::<ChatResponse>().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = content.len(), "received completion");
        Ok(content)
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<TextStream, GenerationError> {
        request.validate()?;
        let response = self.post(request, true).await?;
        Ok(Box::pin(decode_chat_sse(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn sse_body(chunks: &[&str]) -> Vec<Result<Vec<u8>, Infallible>> {
        chunks
            .iter()
            .map(|c| Ok(format!("data: {}\n\n", c).into_bytes()))
            .collect()
    }

    async fn collect(chunks: Vec<Result<Vec<u8>, Infallible>>) -> Vec<String> {
        decode_chat_sse(futures::stream::iter(chunks))
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
    }

    #[test]
    fn test_extract_delta_reads_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(extract_delta(data), Some("Hello".to_string()));
    }

    #[test]
    fn test_extract_delta_skips_role_announcement() {
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(extract_delta(data), None);
    }

    #[test]
    fn test_extract_delta_skips_invalid_json() {
        assert_eq!(extract_delta("not json"), None);
    }

    #[tokio::test]
    async fn test_decode_sse_yields_deltas_in_order() {
        let deltas = collect(sse_body(&[
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
            r#"{"choices":[{"delta":{"content":", world"}}]}"#,
            "[DONE]",
        ]))
        .await;
        assert_eq!(deltas, vec!["Hello".to_string(), ", world".to_string()]);
    }

    #[tokio::test]
    async fn test_decode_sse_stops_at_done_sentinel() {
        let deltas = collect(sse_body(&[
            r#"{"choices":[{"delta":{"content":"before"}}]}"#,
            "[DONE]",
            r#"{"choices":[{"delta":{"content":"after"}}]}"#,
        ]))
        .await;
        assert_eq!(deltas, vec!["before".to_string()]);
    }

    #[tokio::test]
    async fn test_decode_sse_empty_body_yields_nothing() {
        let deltas = collect(Vec::new()).await;
        assert!(deltas.is_empty());
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_prompts_before_network() {
        let client = OpenAiClient::new("test-key");
        let request = GenerationRequest::new("", "", 0.7);
        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
    }
}
