//! Hosted proxy-function backend. Speaks the app's own wire shape:
//! `{systemPrompt, userPrompt, temperature}` in, `{content}` or `{error}`
//! out; the streaming sibling endpoint returns raw text deltas as chunked
//! bytes.

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GenerationError, GenerationRequest, Generator, TextStream};

pub struct ProxyClient {
    http: reqwest::Client,
    url: String,
    stream_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyRequest<'a> {
    system_prompt: &'a str,
    user_prompt: &'a str,
    temperature: f32,
}

#[derive(Deserialize)]
struct ProxyResponse {
    content: Option<String>,
    error: Option<String>,
}

impl ProxyClient {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        let url = url.into();
        let stream_url = format!("{}/stream", url.trim_end_matches('/'));
        Self {
            http: reqwest::Client::new(),
            url,
            stream_url,
            api_key,
        }
    }

    /// Override the streaming sibling endpoint.
    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.stream_url = stream_url.into();
        self
    }

    async fn post(
        &self,
        url: &str,
        request: &GenerationRequest,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = ProxyRequest {
            system_prompt: &request.system_prompt,
            user_prompt: &request.user_prompt,
            temperature: request.temperature,
        };
        let mut builder = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            // The proxy reports failures as {error} with a non-2xx status.
            let message = match response.json::<ProxyResponse>().await {
                Ok(ProxyResponse {
                    error: Some(error), ..
                }) => error,
                _ => String::new(),
            };
            return Err(GenerationError::Upstream { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for ProxyClient {
    fn name(&self) -> &str {
        "proxy"
    }

    #[instrument(skip(self, request))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        request.validate()?;
        let response = self.post(&self.url, request).await?;
        let status = response.status();
        let parsed = response.json::<ProxyResponse>().await?;
        match parsed {
            ProxyResponse {
                content: Some(content),
                ..
            } => {
                debug!(chars = content.len(), "received completion");
                Ok(content)
            }
            ProxyResponse { error, .. } => Err(GenerationError::Upstream {
                status,
                message: error.unwrap_or_else(|| "empty response".to_string()),
            }),
        }
    }

    #[instrument(skip(self, request))]
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<TextStream, GenerationError> {
        request.validate()?;
        let response = self.post(&self.stream_url, request).await?;
        let stream = response
            .bytes_stream()
            .map_err(GenerationError::from)
            .map_ok(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .try_filter(|chunk| futures::future::ready(!chunk.is_empty()));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_derived_from_base() {
        let client = ProxyClient::new("https://example.test/functions/generate", None);
        assert_eq!(
            client.stream_url,
            "https://example.test/functions/generate/stream"
        );
    }

    #[test]
    fn test_stream_url_ignores_trailing_slash() {
        let client = ProxyClient::new("https://example.test/generate/", None);
        assert_eq!(client.stream_url, "https://example.test/generate/stream");
    }

    #[test]
    fn test_request_body_uses_camel_case_fields() {
        let body = ProxyRequest {
            system_prompt: "sys",
            user_prompt: "usr",
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemPrompt"], "sys");
        assert_eq!(json["userPrompt"], "usr");
        assert_eq!(json["temperature"], 0.5);
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_prompts_before_network() {
        let client = ProxyClient::new("https://example.test/generate", None);
        let request = GenerationRequest::new("", "user", 0.7);
        let err = client.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
    }
}
