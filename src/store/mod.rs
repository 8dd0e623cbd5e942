//! Persistence against the hosted storage backend.
//!
//! Speaks PostgREST-style HTTP (`/rest/v1/<table>` with `apikey` + bearer
//! headers). Constructed explicitly and passed in; failures here are
//! surfaced but never abort the pipeline, so the generated content is still
//! shown when saving fails.

pub mod autosave;

pub use autosave::{ContentSink, DebouncedSaver};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::prompt::{RegenerationPreset, UserPreferences};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Storage backend returned {status}: {message}")]
    Upstream {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Storage backend returned no row")]
    EmptyReply,
}

/// A generated/edited post, the unit a history view lists and an editor
/// loads. Exactly one current content string per post: regeneration and
/// manual edits overwrite it, no version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPost {
    pub id: String,
    pub pr_url: String,
    pub title: String,
    pub content: String,
    pub user_id: String,
    #[serde(default)]
    pub is_draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Row to insert for a newly generated post.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub pr_url: String,
    pub title: String,
    pub content: String,
    pub user_id: String,
    pub is_draft: bool,
}

#[derive(Serialize)]
struct ContentPatch<'a> {
    content: &'a str,
}

pub struct PostStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PostStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn table(&self, name: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), name)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Upstream { status, message })
    }

    /// Look up an existing post for this PR and user.
    #[instrument(skip(self))]
    pub async fn find_cached(
        &self,
        pr_url: &str,
        user_id: &str,
    ) -> Result<Option<CachedPost>, StoreError> {
        let response = self
            .authed(self.http.get(self.table("cached_posts")).query(&[
                ("pr_url", format!("eq.{}", pr_url)),
                ("user_id", format!("eq.{}", user_id)),
                ("limit", "1".to_string()),
            ]))
            .send()
            .await?;
        let rows = Self::check(response).await?.json::<Vec<CachedPost>>().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert a newly generated post and return the stored row.
    #[instrument(skip(self, post), fields(pr_url = %post.pr_url))]
    pub async fn insert_post(&self, post: &NewPost) -> Result<CachedPost, StoreError> {
        let response = self
            .authed(self.http.post(self.table("cached_posts")))
            .header("Prefer", "return=representation")
            .json(post)
            .send()
            .await?;
        let mut rows = Self::check(response).await?.json::<Vec<CachedPost>>().await?;
        debug!(rows = rows.len(), "inserted post");
        if rows.is_empty() {
            return Err(StoreError::EmptyReply);
        }
        Ok(rows.remove(0))
    }

    /// Overwrite the current content of a post. Regeneration and manual
    /// edits both go through here.
    #[instrument(skip(self, content), fields(content_chars = content.len()))]
    pub async fn update_content(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let response = self
            .authed(
                self.http
                    .patch(self.table("cached_posts"))
                    .query(&[("id", format!("eq.{}", id))]),
            )
            .json(&ContentPatch { content })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// All posts for a user, newest first.
    #[instrument(skip(self))]
    pub async fn list_history(&self, user_id: &str) -> Result<Vec<CachedPost>, StoreError> {
        let response = self
            .authed(self.http.get(self.table("cached_posts")).query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("order", "created_at.desc".to_string()),
            ]))
            .send()
            .await?;
        Ok(Self::check(response).await?.json::<Vec<CachedPost>>().await?)
    }

    /// Centrally seeded regeneration presets, ordered by name.
    #[instrument(skip(self))]
    pub async fn load_presets(&self) -> Result<Vec<RegenerationPreset>, StoreError> {
        let response = self
            .authed(self.http.get(self.table("regeneration_presets")).query(&[
                ("is_default", "eq.true".to_string()),
                ("order", "name.asc".to_string()),
            ]))
            .send()
            .await?;
        Ok(Self::check(response)
            .await?
            .json::<Vec<RegenerationPreset>>()
            .await?)
    }

    /// A user's personalization settings; None before their first settings
    /// visit.
    #[instrument(skip(self))]
    pub async fn load_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<UserPreferences>, StoreError> {
        let response = self
            .authed(self.http.get(self.table("user_preferences")).query(&[
                ("user_id", format!("eq.{}", user_id)),
                ("limit", "1".to_string()),
            ]))
            .send()
            .await?;
        let rows = Self::check(response)
            .await?
            .json::<Vec<UserPreferences>>()
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Create or replace a user's personalization settings.
    #[instrument(skip(self, preferences), fields(user_id = %preferences.user_id))]
    pub async fn save_preferences(&self, preferences: &UserPreferences) -> Result<(), StoreError> {
        let response = self
            .authed(
                self.http
                    .post(self.table("user_preferences"))
                    .query(&[("on_conflict", "user_id")]),
            )
            .header("Prefer", "resolution=merge-duplicates")
            .json(preferences)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
