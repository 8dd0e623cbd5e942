//! End-to-end pipeline tests against mock HTTP servers: GitHub fetch,
//! prompt composition, generation backends, and post persistence.

use std::sync::{Arc, Mutex};

use futures::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pull2press::generate::{GenerationRequest, Generator, OpenAiClient, ProxyClient};
use pull2press::github::{parse_pr_url, FetchProgress, GitHubClient, GitHubError, ProgressSink};
use pull2press::prompt;
use pull2press::store::{NewPost, PostStore};

async fn mount_pr_endpoints(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Add new feature",
            "body": "Adds the widget pipeline",
            "user": {"login": "alice", "avatar_url": "https://example.test/alice.png"},
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-05-02T08:00:00Z"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/42/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "sha": "a1b2c3d",
                "html_url": "https://github.com/acme/widgets/commit/a1b2c3d",
                "commit": {"message": "Initial implementation"}
            },
            {
                "sha": "e4f5a6b",
                "html_url": "https://github.com/acme/widgets/commit/e4f5a6b",
                "commit": {"message": "Add tests"}
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/42/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "filename": "src/feature.ts",
                "status": "modified",
                "additions": 50,
                "deletions": 10,
                "changes": 60,
                "patch": "@@ -1 +1,2 @@"
            }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_compose_and_generate_through_proxy() {
    let github = MockServer::start().await;
    mount_pr_endpoints(&github).await;

    let client = GitHubClient::with_base_url(github.uri(), None);
    let pr = parse_pr_url("https://github.com/acme/widgets/pull/42").unwrap();
    let data = client.fetch_pull_request(&pr).await.unwrap();

    assert_eq!(data.title, "Add new feature");
    assert_eq!(data.commits.len(), 2);
    assert_eq!(data.files.len(), 1);
    assert_eq!(data.author.login, "alice");

    let system = prompt::build_system_prompt(None, None);
    let user = prompt::build_user_prompt(&data, None);
    let temperature = prompt::temperature(None);

    assert!(system.starts_with("You are a software engineer writing about your own work."));
    assert!(user.contains("Title: Add new feature"));
    assert!(user.contains("- Initial implementation"));
    assert!(user.contains("- Add tests"));
    assert!(user.contains("- src/feature.ts (50 additions, 10 deletions)"));
    assert_eq!(temperature, 0.7);

    let proxy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"content": "# The post\n\nBody."})),
        )
        .mount(&proxy)
        .await;

    let generator = ProxyClient::new(format!("{}/generate", proxy.uri()), None);
    let request = GenerationRequest::new(system, user, temperature);
    let content = generator.generate(&request).await.unwrap();
    assert_eq!(content, "# The post\n\nBody.");
}

#[tokio::test]
async fn fetch_reports_monotonic_progress_in_stage_order() {
    let github = MockServer::start().await;
    mount_pr_endpoints(&github).await;

    let seen: Arc<Mutex<Vec<FetchProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let sink = ProgressSink::new(move |p| seen_clone.lock().unwrap().push(p));

    let client = GitHubClient::with_base_url(github.uri(), None);
    let pr = parse_pr_url("https://github.com/acme/widgets/pull/42").unwrap();
    client.fetch_with_progress(&pr, &sink).await.unwrap();

    let updates = seen.lock().unwrap();
    assert!(!updates.is_empty());
    let percents: Vec<u8> = updates.iter().map(|p| p.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    let stages: Vec<_> = updates.iter().map(|p| p.stage).collect();
    let mut sorted = stages.clone();
    sorted.sort();
    assert_eq!(stages, sorted);
}

#[tokio::test]
async fn exhausted_quota_maps_to_rate_limit_error() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .set_body_string("rate limit exceeded"),
        )
        .mount(&github)
        .await;

    let client = GitHubClient::with_base_url(github.uri(), None);
    let pr = parse_pr_url("https://github.com/acme/widgets/pull/42").unwrap();
    let err = client.fetch_pull_request(&pr).await.unwrap_err();
    assert!(matches!(err, GitHubError::RateLimited));
}

#[tokio::test]
async fn server_error_maps_to_upstream_error() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&github)
        .await;

    let client = GitHubClient::with_base_url(github.uri(), None);
    let pr = parse_pr_url("https://github.com/acme/widgets/pull/42").unwrap();
    let err = client.fetch_pull_request(&pr).await.unwrap_err();
    assert!(matches!(err, GitHubError::Upstream { .. }));
}

#[tokio::test]
async fn discussion_enrichment_degrades_to_empty_lists() {
    let github = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/issues/42/comments"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/42/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "body": "Looks good",
                "state": "APPROVED",
                "user": {"login": "bob"},
                "submitted_at": "2024-05-02T09:00:00Z"
            }
        ])))
        .mount(&github)
        .await;

    let client = GitHubClient::with_base_url(github.uri(), None);
    let pr = parse_pr_url("https://github.com/acme/widgets/pull/42").unwrap();
    let discussion = client.fetch_discussion(&pr).await;

    assert!(discussion.comments.is_empty());
    assert_eq!(discussion.reviews.len(), 1);
    assert_eq!(discussion.reviews[0].user, "bob");
}

#[tokio::test]
async fn openai_streaming_decodes_sse_deltas() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\", world\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = OpenAiClient::with_base_url(server.uri(), "test-key");
    let request = GenerationRequest::new("system", "user", 0.7);
    let stream = client.generate_stream(&request).await.unwrap();
    let deltas: Vec<String> = stream.try_collect().await.unwrap();

    assert_eq!(deltas, vec!["Hello".to_string(), ", world".to_string()]);
}

#[tokio::test]
async fn proxy_streaming_yields_raw_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string("The whole answer"))
        .mount(&server)
        .await;

    let generator = ProxyClient::new(format!("{}/generate", server.uri()), None);
    let request = GenerationRequest::new("system", "user", 0.7);
    let stream = generator.generate_stream(&request).await.unwrap();
    let chunks: Vec<String> = stream.try_collect().await.unwrap();

    assert_eq!(chunks.concat(), "The whole answer");
}

#[tokio::test]
async fn proxy_error_body_surfaces_in_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "no key configured"})),
        )
        .mount(&server)
        .await;

    let generator = ProxyClient::new(format!("{}/generate", server.uri()), None);
    let request = GenerationRequest::new("system", "user", 0.7);
    let err = generator.generate(&request).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("no key configured"), "got: {}", message);
}

fn stored_row(content: &str) -> serde_json::Value {
    json!({
        "id": "7f8d2b1e",
        "pr_url": "https://github.com/acme/widgets/pull/42",
        "title": "Add new feature",
        "content": content,
        "user_id": "user-1",
        "is_draft": false,
        "created_at": "2024-05-01T12:00:00Z",
        "updated_at": "2024-05-01T12:00:00Z"
    })
}

#[tokio::test]
async fn insert_then_update_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cached_posts"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([stored_row("# Post")])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/cached_posts"))
        .and(query_param("id", "eq.7f8d2b1e"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let store = PostStore::new(server.uri(), "anon-key");
    let saved = store
        .insert_post(&NewPost {
            pr_url: "https://github.com/acme/widgets/pull/42".to_string(),
            title: "Add new feature".to_string(),
            content: "# Post".to_string(),
            user_id: "user-1".to_string(),
            is_draft: false,
        })
        .await
        .unwrap();
    assert_eq!(saved.id, "7f8d2b1e");

    store.update_content(&saved.id, "# Post v2").await.unwrap();
}

#[tokio::test]
async fn history_lists_newest_first_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/cached_posts"))
        .and(query_param("user_id", "eq.user-1"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([stored_row("# Newest"), stored_row("# Older")])),
        )
        .mount(&server)
        .await;

    let store = PostStore::new(server.uri(), "anon-key");
    let history = store.list_history("user-1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "# Newest");
}

#[tokio::test]
async fn loaded_preset_drives_prompt_and_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/regeneration_presets"))
        .and(query_param("is_default", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "More technical",
                "description": "Deeper implementation detail",
                "system_prompt_modifier": "Go deeper on implementation internals.",
                "user_prompt_modifier": "Focus on the trickiest change.",
                "temperature": 0.5,
                "is_default": true
            }
        ])))
        .mount(&server)
        .await;

    let store = PostStore::new(server.uri(), "anon-key");
    let presets = store.load_presets().await.unwrap();
    assert_eq!(presets.len(), 1);

    let options = prompt::RegenerationOptions::preset(presets[0].clone());
    let system = prompt::build_system_prompt(None, Some(&options));
    assert!(system.contains("Go deeper on implementation internals."));
    assert_eq!(prompt::temperature(Some(&options)), 0.5);
}
