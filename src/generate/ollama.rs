//! Local Ollama chat backend. Full responses use `stream: false`; the
//! streaming variant decodes Ollama's newline-delimited JSON chunks.

use async_trait::async_trait;
use futures::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GenerationError, GenerationRequest, Generator, TextStream};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3";

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    options: Options,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatReply {
    message: Option<ReplyMessage>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Probe whether the local server answers at all.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/status", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn post(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
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
            options: Options {
                temperature: request.temperature,
            },
            stream,
        };
        let response = self.http.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream { status, message });
        }
        Ok(response)
    }
}

/// Pull the message content out of one NDJSON chunk line. Lines without
/// content (the final `done` marker, keep-alives) yield nothing.
fn extract_chunk(line: &str) -> Option<String> {
    let chunk: serde_json::Value = serde_json::from_str(line).ok()?;
    chunk
        .get("message")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Split a byte stream into newline-delimited JSON chunks and decode each
/// into a text delta.
fn decode_ndjson<S, B, E>(stream: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<GenerationError> + Send + 'static,
{
    stream
        .scan(String::new(), |buf, chunk| {
            let out: Vec<Result<String, GenerationError>> = match chunk {
                Ok(bytes) => {
                    buf.push_str(&String::from_utf8_lossy(bytes.as_ref()));
                    let mut deltas = Vec::new();
                    while let Some(pos) = buf.find('\n') {
                        let line: String = buf.drain(..=pos).collect();
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(delta) = extract_chunk(line) {
                            deltas.push(Ok(delta));
                        }
                    }
                    deltas
                }
                Err(e) => vec![Err(e.into())],
            };
            future::ready(Some(futures::stream::iter(out)))
        })
        .flatten()
}

#[async_trait]
impl Generator for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        request.validate()?;
        let response = self.post(request, false).await?;
        let parsed = response.json::<ChatReply>().await?;
        let content = parsed.message.map(|m| m.content).unwrap_or_default();
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
        let stream = decode_ndjson(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(GenerationError::from)),
        );
        Ok(Box::pin(stream))
    }
}
