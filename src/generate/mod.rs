pub mod ollama;
pub mod openai;
pub mod proxy;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use proxy::ProxyClient;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tracing::info;

use crate::config::{Backend, Config};

/// Incremental text deltas from a streaming generation. Dropping the stream
/// abandons the request; nothing is sent upstream to cancel it.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid generation request: {0}")]
    InvalidInput(String),

    #[error("Missing credential: set {0}")]
    MissingCredential(&'static str),

    #[error("Generation API returned {status}: {message}")]
    Upstream {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Generation stream failed: {0}")]
    Stream(String),
}

/// A composed generation request: both prompts plus the resolved temperature.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature,
        }
    }

    /// Both prompts must be non-empty before any network call is made.
    pub(crate) fn validate(&self) -> Result<(), GenerationError> {
        if self.system_prompt.trim().is_empty() {
            return Err(GenerationError::InvalidInput(
                "system prompt is empty".to_string(),
            ));
        }
        if self.user_prompt.trim().is_empty() {
            return Err(GenerationError::InvalidInput(
                "user prompt is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A chat-completion backend. One attempt per call: no retry, no backoff,
/// no circuit breaking; the caller decides whether to surface the error.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend name for logs and error messages (e.g., "openai").
    fn name(&self) -> &str;

    /// Generate the full response text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Generate as an incremental stream of text deltas.
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<TextStream, GenerationError>;
}

/// Pick and construct the generation backend once at startup, from
/// configuration. Never branched per call.
pub fn resolve_generator(config: &Config) -> Result<Box<dyn Generator>, GenerationError> {
    let backend = config.generation_backend();
    info!(backend = %backend, "resolved generation backend");
    match backend {
        Backend::OpenAi => {
            let api_key = config
                .openai_api_key()
                .ok_or(GenerationError::MissingCredential("OPENAI_API_KEY"))?;
            let mut client = OpenAiClient::new(api_key);
            if let Some(model) = config.generation.model.clone() {
                client = client.with_model(model);
            }
            Ok(Box::new(client))
        }
        Backend::Ollama => {
            let mut client = OllamaClient::new(config.ollama_url());
            if let Some(model) = config.generation.model.clone() {
                client = client.with_model(model);
            }
            Ok(Box::new(client))
        }
        Backend::Proxy => {
            let url = config
                .proxy_url()
                .ok_or(GenerationError::MissingCredential("PULL2PRESS_PROXY_URL"))?;
            Ok(Box::new(ProxyClient::new(url, config.backend_key())))
        }
    }
}
