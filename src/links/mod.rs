//! Reference-link suggestions for a generated post.
//!
//! Thin client over the hosted link-suggestion function. Any failure
//! degrades to a fixed fallback list so the editor flow never breaks on
//! this enrichment.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

const DEFAULT_MAX_LINKS: usize = 5;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Link suggestion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Link suggestion API returned {status}")]
    Upstream { status: reqwest::StatusCode },
}

/// How strongly a suggested link relates to the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Low,
    Medium,
    High,
}

/// What kind of resource a suggested link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Documentation,
    Tutorial,
    Reference,
    Article,
    Tool,
}

/// One suggested reference link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub title: String,
    pub url: String,
    pub description: String,
    pub relevance: Relevance,
    #[serde(rename = "type")]
    pub link_type: LinkType,
}

/// Response from the link-suggestion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkFinderResponse {
    pub links: Vec<LinkSuggestion>,
    #[serde(default)]
    pub topics: Option<String>,
}

/// Optional knobs for one suggestion request.
#[derive(Debug, Clone, Default)]
pub struct LinkFinderOptions {
    pub topic: Option<String>,
    pub max_links: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkFinderRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    max_links: usize,
}

pub struct LinkFinder {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl LinkFinder {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            api_key,
        }
    }

    /// Ask the hosted function for helpful links. Falls back to a fixed
    /// list on any failure instead of erroring; callers never lose the
    /// post over a broken enrichment.
    #[instrument(skip(self, content, options), fields(content_chars = content.len()))]
    pub async fn find(&self, content: &str, options: &LinkFinderOptions) -> LinkFinderResponse {
        match self.request(content, options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "link suggestion failed; using fallback links");
                fallback_links()
            }
        }
    }

    async fn request(
        &self,
        content: &str,
        options: &LinkFinderOptions,
    ) -> Result<LinkFinderResponse, LinkError> {
        let body = LinkFinderRequest {
            content,
            topic: options.topic.as_deref(),
            max_links: options.max_links.unwrap_or(DEFAULT_MAX_LINKS),
        };
        let mut builder = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::Upstream { status });
        }
        Ok(response.json::<LinkFinderResponse>().await?)
    }
}

/// Fixed links served when the suggestion service is unavailable.
fn fallback_links() -> LinkFinderResponse {
    LinkFinderResponse {
        links: vec![
            LinkSuggestion {
                title: "MDN Web Docs".to_string(),
                url: "https://developer.mozilla.org".to_string(),
                description: "Comprehensive documentation for web technologies".to_string(),
                relevance: Relevance::High,
                link_type: LinkType::Documentation,
            },
            LinkSuggestion {
                title: "GitHub Documentation".to_string(),
                url: "https://docs.github.com".to_string(),
                description: "Official GitHub documentation and guides".to_string(),
                relevance: Relevance::Medium,
                link_type: LinkType::Documentation,
            },
        ],
        topics: None,
    }
}

/// Render link suggestions as a markdown "Helpful Resources" section,
/// grouped by relevance.
pub fn format_links_as_markdown(links: &[LinkSuggestion]) -> String {
    if links.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\n## Helpful Resources\n\n");
    let sections = [
        (Relevance::High, "Essential Reading"),
        (Relevance::Medium, "Additional Resources"),
        (Relevance::Low, "Further Reading"),
    ];

    for (relevance, heading) in sections {
        let group: Vec<&LinkSuggestion> =
            links.iter().filter(|l| l.relevance == relevance).collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("### {}\n\n", heading));
        for link in group {
            out.push_str(&format!(
                "- [{}]({}) - {}\n",
                link.title, link.url, link.description
            ));
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}
