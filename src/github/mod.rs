pub mod progress;
pub mod types;

pub use progress::{FetchProgress, FetchStage, ProgressSink};
pub use types::{
    Author, Commit, Discussion, FileChange, FileStatus, IssueComment, PrStats, PrUrl,
    PullRequestData, Review,
};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Commits beyond this prefix are dropped to keep prompt size predictable.
const MAX_COMMITS: usize = 20;
/// Files beyond this prefix are dropped to keep prompt size predictable.
const MAX_FILES: usize = 50;
/// Comments/reviews beyond this prefix are dropped from the enrichment data.
const MAX_DISCUSSION_ITEMS: usize = 10;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Invalid PR URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub API rate limit exceeded; authenticate to continue")]
    RateLimited,

    #[error("GitHub API returned {status} for {url}")]
    Upstream {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("GitHub API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Parse a GitHub PR URL into its component parts.
///
/// Expected format: https://github.com/{owner}/{repo}/pull/{number}
pub fn parse_pr_url(url: &str) -> Result<PrUrl, GitHubError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    if parsed.host_str() != Some("github.com") {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(|| GitHubError::InvalidUrl(url.to_string()))?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() != 4 || segments[2] != "pull" {
        return Err(GitHubError::InvalidUrl(url.to_string()));
    }

    let number = segments[3]
        .parse::<u64>()
        .map_err(|_| GitHubError::InvalidUrl(url.to_string()))?;

    Ok(PrUrl {
        owner: segments[0].to_string(),
        repo: segments[1].to_string(),
        number,
    })
}

// Wire types: private mirrors of the GitHub REST responses. Domain types in
// types.rs are assembled from these by hand.

#[derive(Deserialize)]
struct UserWire {
    login: String,
    #[serde(default)]
    avatar_url: String,
}

#[derive(Deserialize)]
struct PullWire {
    title: String,
    body: Option<String>,
    user: Option<UserWire>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CommitDetailWire {
    message: String,
}

#[derive(Deserialize)]
struct CommitWire {
    sha: String,
    html_url: String,
    commit: CommitDetailWire,
}

#[derive(Deserialize)]
struct FileWire {
    filename: String,
    status: String,
    additions: usize,
    deletions: usize,
    changes: usize,
    patch: Option<String>,
}

#[derive(Deserialize)]
struct IssueCommentWire {
    body: Option<String>,
    user: Option<UserWire>,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ReviewWire {
    body: Option<String>,
    state: String,
    user: Option<UserWire>,
    submitted_at: Option<DateTime<Utc>>,
}

/// Client for the GitHub REST API. Works unauthenticated against the public
/// quota; pass a token to raise the limit and reach private repos.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url("https://api.github.com", token)
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("User-Agent", "pull2press")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Map a non-success response to the error taxonomy. 429, and 403 with an
    /// exhausted quota header, signal rate limiting; everything else is a
    /// generic upstream failure.
    fn check(response: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GitHubError::RateLimited);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            let exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "0")
                .unwrap_or(false);
            if exhausted {
                return Err(GitHubError::RateLimited);
            }
        }
        Err(GitHubError::Upstream {
            status,
            url: response.url().to_string(),
        })
    }

    async fn fetch_metadata(&self, pr: &PrUrl) -> Result<PullWire, GitHubError> {
        let path = format!("/repos/{}/{}/pulls/{}", pr.owner, pr.repo, pr.number);
        debug!(%pr, "fetching PR metadata");
        let response = Self::check(self.get(&path).send().await?)?;
        Ok(response.json::<PullWire>().await?)
    }

    async fn fetch_commits(&self, pr: &PrUrl) -> Result<Vec<CommitWire>, GitHubError> {
        let path = format!("/repos/{}/{}/pulls/{}/commits", pr.owner, pr.repo, pr.number);
        debug!(%pr, "fetching PR commits");
        let response = Self::check(self.get(&path).send().await?)?;
        Ok(response.json::<Vec<CommitWire>>().await?)
    }

    async fn fetch_files(&self, pr: &PrUrl) -> Result<Vec<FileWire>, GitHubError> {
        let path = format!("/repos/{}/{}/pulls/{}/files", pr.owner, pr.repo, pr.number);
        debug!(%pr, "fetching PR files");
        let response = Self::check(self.get(&path).send().await?)?;
        Ok(response.json::<Vec<FileWire>>().await?)
    }

    /// Fetch a complete PR snapshot: metadata, commits, and changed files.
    ///
    /// The three retrievals have no ordering dependency, so they run
    /// concurrently and join. Commits and files are capped to bounded
    /// prefixes; the stats record the uncapped totals.
    #[instrument(skip(self), fields(pr = %pr))]
    pub async fn fetch_pull_request(&self, pr: &PrUrl) -> Result<PullRequestData, GitHubError> {
        let (metadata, commits, files) = tokio::try_join!(
            self.fetch_metadata(pr),
            self.fetch_commits(pr),
            self.fetch_files(pr),
        )?;
        Ok(Self::assemble(metadata, commits, files))
    }

    /// Same as [`fetch_pull_request`](Self::fetch_pull_request), reporting
    /// staged progress through `sink`. Reporting is sequenced by this routine
    /// even though the underlying requests complete in any order.
    #[instrument(skip(self, sink), fields(pr = %pr))]
    pub async fn fetch_with_progress(
        &self,
        pr: &PrUrl,
        sink: &ProgressSink,
    ) -> Result<PullRequestData, GitHubError> {
        sink.emit(FetchStage::PrDetails, 10, "Fetching pull request data...");

        let (metadata, commits, files) = tokio::try_join!(
            self.fetch_metadata(pr),
            self.fetch_commits(pr),
            self.fetch_files(pr),
        )?;

        sink.emit(
            FetchStage::Commits,
            35,
            format!("Processing {} commits...", commits.len()),
        );
        sink.emit(
            FetchStage::Files,
            60,
            format!("Processing {} changed files...", files.len()),
        );

        let data = Self::assemble(metadata, commits, files);

        sink.emit(FetchStage::Generating, 80, "Preparing content generation...");
        Ok(data)
    }

    fn assemble(
        metadata: PullWire,
        commits: Vec<CommitWire>,
        files: Vec<FileWire>,
    ) -> PullRequestData {
        let stats = PrStats {
            total_commits: commits.len(),
            total_files: files.len(),
            additions: files.iter().map(|f| f.additions).sum(),
            deletions: files.iter().map(|f| f.deletions).sum(),
        };

        let commits = commits
            .into_iter()
            .take(MAX_COMMITS)
            .map(|c| Commit {
                message: c.commit.message,
                sha: c.sha,
                url: c.html_url,
            })
            .collect();

        let files = files
            .into_iter()
            .take(MAX_FILES)
            .map(|f| FileChange {
                filename: f.filename,
                status: FileStatus::parse(&f.status),
                additions: f.additions,
                deletions: f.deletions,
                changes: f.changes,
                patch: f.patch,
            })
            .collect();

        let author = metadata
            .user
            .map(|u| Author {
                login: u.login,
                avatar_url: u.avatar_url,
            })
            .unwrap_or_default();

        PullRequestData {
            title: metadata.title,
            description: metadata.body.unwrap_or_default(),
            commits,
            files,
            author,
            created_at: metadata.created_at,
            updated_at: metadata.updated_at,
            stats,
        }
    }

    /// Fetch comments and reviews as a secondary enrichment step. Either
    /// call failing degrades to an empty list instead of failing the fetch.
    #[instrument(skip(self), fields(pr = %pr))]
    pub async fn fetch_discussion(&self, pr: &PrUrl) -> Discussion {
        let comments_path = format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner, pr.repo, pr.number
        );
        let reviews_path = format!(
            "/repos/{}/{}/pulls/{}/reviews",
            pr.owner, pr.repo, pr.number
        );

        let comments = async {
            let response = Self::check(self.get(&comments_path).send().await?)?;
            response
                .json::<Vec<IssueCommentWire>>()
                .await
                .map_err(GitHubError::from)
        };
        let reviews = async {
            let response = Self::check(self.get(&reviews_path).send().await?)?;
            response
                .json::<Vec<ReviewWire>>()
                .await
                .map_err(GitHubError::from)
        };

        let (comments, reviews) = tokio::join!(comments, reviews);

        let comments = match comments {
            Ok(list) => list
                .into_iter()
                .take(MAX_DISCUSSION_ITEMS)
                .map(|c| IssueComment {
                    body: c.body.unwrap_or_default(),
                    user: c.user.map(|u| u.login).unwrap_or_else(|| "unknown".to_string()),
                    created_at: c.created_at,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to fetch PR comments; continuing without them");
                Vec::new()
            }
        };

        let reviews = match reviews {
            Ok(list) => list
                .into_iter()
                .take(MAX_DISCUSSION_ITEMS)
                .map(|r| Review {
                    body: r.body.unwrap_or_default(),
                    state: r.state,
                    user: r.user.map(|u| u.login).unwrap_or_else(|| "unknown".to_string()),
                    submitted_at: r.submitted_at,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to fetch PR reviews; continuing without them");
                Vec::new()
            }
        };

        Discussion { comments, reviews }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_pr_url() {
        let url = parse_pr_url("https://github.com/acme/widgets/pull/42").unwrap();
        assert_eq!(url.owner, "acme");
        assert_eq!(url.repo, "widgets");
        assert_eq!(url.number, 42);
    }

    #[test]
    fn test_parse_rejects_missing_pull_segment() {
        assert!(parse_pr_url("https://github.com/acme/widgets").is_err());
        assert!(parse_pr_url("https://github.com/acme/widgets/pulls/42").is_err());
        assert!(parse_pr_url("https://github.com/acme/widgets/issues/42").is_err());
    }

    #[test]
    fn test_parse_rejects_other_hosts_and_garbage() {
        assert!(parse_pr_url("https://gitlab.com/acme/widgets/pull/42").is_err());
        assert!(parse_pr_url("not-a-url").is_err());
        assert!(parse_pr_url("").is_err());
    }

    #[test]
    fn test_parse_rejects_non_numeric_pr_number() {
        assert!(parse_pr_url("https://github.com/acme/widgets/pull/latest").is_err());
    }

    #[test]
    fn test_parse_tolerates_trailing_slash() {
        let url = parse_pr_url("https://github.com/acme/widgets/pull/7/").unwrap();
        assert_eq!(url.number, 7);
    }

    #[test]
    fn test_assemble_caps_commits_and_files() {
        let commits: Vec<CommitWire> = (0..30)
            .map(|i| CommitWire {
                sha: format!("sha{}", i),
                html_url: format!("https://github.com/acme/widgets/commit/{}", i),
                commit: CommitDetailWire {
                    message: format!("commit {}", i),
                },
            })
            .collect();
        let files: Vec<FileWire> = (0..60)
            .map(|i| FileWire {
                filename: format!("src/file{}.rs", i),
                status: "modified".to_string(),
                additions: 2,
                deletions: 1,
                changes: 3,
                patch: None,
            })
            .collect();
        let metadata = PullWire {
            title: "Big PR".to_string(),
            body: None,
            user: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let data = GitHubClient::assemble(metadata, commits, files);
        assert_eq!(data.commits.len(), MAX_COMMITS);
        assert_eq!(data.files.len(), MAX_FILES);
        assert_eq!(data.stats.total_commits, 30);
        assert_eq!(data.stats.total_files, 60);
        assert_eq!(data.stats.additions, 120);
        assert_eq!(data.stats.deletions, 60);
        assert_eq!(data.description, "");
    }
}
