use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use pull2press::config::Config;
use pull2press::generate::{self, GenerationRequest, Generator};
use pull2press::github::types::{Author, Commit, FileChange, FileStatus, PrStats};
use pull2press::github::{self, FetchStage, GitHubClient, ProgressSink, PullRequestData};
use pull2press::links::{format_links_as_markdown, LinkFinder, LinkFinderOptions};
use pull2press::prompt::{self, RegenerationOptions, UserPreferences};
use pull2press::store::{NewPost, PostStore};

/// pull2press — CLI that takes a GitHub Pull Request URL and drafts a
/// first-person technical blog post about it with a language model.
#[derive(Parser, Debug)]
#[command(name = "pull2press", version, about)]
struct Cli {
    /// GitHub Pull Request URL (e.g., https://github.com/acme/widgets/pull/42)
    ///
    /// Not required when --mock is used.
    pr_url: Option<String>,

    /// Optional output file path for the generated markdown
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stream generated text to stdout as it is produced
    #[arg(long)]
    stream: bool,

    /// Regenerate with a named preset (requires the storage backend)
    #[arg(long)]
    preset: Option<String>,

    /// Regenerate with a free-form extra instruction
    #[arg(long, conflicts_with = "preset")]
    custom_prompt: Option<String>,

    /// Lean on the writing style derived from your stored samples
    #[arg(long)]
    use_style: bool,

    /// Sampling temperature override (0.0 to 1.0)
    #[arg(long)]
    temperature: Option<f32>,

    /// Append suggested reference links to the post
    #[arg(long)]
    links: bool,

    /// Mark the saved post as a draft
    #[arg(long)]
    draft: bool,

    /// Skip persisting the post even when a backend is configured
    #[arg(long)]
    no_save: bool,

    /// Acting user id for persistence and preferences
    #[arg(long)]
    user: Option<String>,

    /// Print the composed prompts and exit without calling the model
    #[arg(long)]
    dry_run: bool,

    /// Use a built-in sample PR for demo purposes (no GitHub token needed)
    #[arg(long)]
    r#mock: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let sink = ProgressSink::new(|p| {
        eprintln!(
            "{} {}",
            format!("[{:>3}% {}]", p.percent, p.stage).dimmed(),
            p.message
        );
    });

    let (pr_url, pr_data) = if cli.r#mock {
        info!("using sample PR data for demo");
        (
            "https://github.com/acme/widgets/pull/42".to_string(),
            sample_pull_request(),
        )
    } else {
        let pr_url = cli.pr_url.clone().ok_or(
            "PR URL is required unless --mock is used. Usage: pull2press <URL> or pull2press --mock",
        )?;

        let _main_span = info_span!("pull2press", pr_url = %pr_url).entered();

        info!("parsing PR URL");
        let parsed = github::parse_pr_url(&pr_url)?;
        debug!(owner = %parsed.owner, repo = %parsed.repo, pr = parsed.number, "parsed PR URL");

        let client = GitHubClient::new(config.github_token());
        info!("fetching pull request from GitHub");
        let data = client.fetch_with_progress(&parsed, &sink).await?;
        info!(
            commits = data.commits.len(),
            files = data.files.len(),
            additions = data.stats.additions,
            deletions = data.stats.deletions,
            "fetched PR data"
        );
        (pr_url, data)
    };

    let store = match (config.backend_url(), config.backend_key()) {
        (Some(url), Some(key)) => Some(Arc::new(PostStore::new(url, key))),
        _ => None,
    };

    let preferences = load_preferences(store.as_deref(), cli.user.as_deref()).await;
    let options = resolve_options(&cli, store.as_deref()).await?;

    let system_prompt = prompt::build_system_prompt(preferences.as_ref(), options.as_ref());
    let user_prompt = prompt::build_user_prompt(&pr_data, options.as_ref());
    let temperature = prompt::temperature(options.as_ref());

    if cli.dry_run {
        println!("=== System prompt (temperature {:.2}) ===", temperature);
        println!("{}", system_prompt);
        println!();
        println!("=== User prompt ===");
        println!("{}", user_prompt);
        return Ok(());
    }

    let generator = generate::resolve_generator(&config)?;
    info!(backend = generator.name(), "generating blog post");
    let request = GenerationRequest::new(system_prompt, user_prompt, temperature);

    let mut content = if cli.stream {
        stream_to_stdout(generator.as_ref(), &request).await?
    } else {
        generator.generate(&request).await?
    };

    if cli.links {
        if let Some(url) = config.backend_url() {
            let finder = LinkFinder::new(
                format!(
                    "{}/functions/v1/find-helpful-links",
                    url.trim_end_matches('/')
                ),
                config.backend_key(),
            );
            let found = finder.find(&content, &LinkFinderOptions::default()).await;
            let section = format_links_as_markdown(&found.links);
            if cli.stream && !section.is_empty() {
                println!("{}", section);
            }
            content.push_str(&section);
        } else {
            warn!("--links requires the storage backend to be configured; skipping");
        }
    }

    sink.emit(FetchStage::Complete, 100, "Done");

    // Persistence failures degrade: the content is still shown and written.
    if !cli.no_save {
        if let (Some(store), Some(user)) = (store.as_deref(), cli.user.as_deref()) {
            if let Err(e) = save_post(store, user, &pr_url, &pr_data.title, &content, cli.draft).await
            {
                warn!(error = %e, "failed to save post; content is shown but not persisted");
            }
        }
    }

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &content)?;
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
        None => {
            if !cli.stream {
                println!("{}", content);
            }
        }
    }

    Ok(())
}

/// Print deltas as they arrive and hand back the assembled post.
async fn stream_to_stdout(
    generator: &dyn Generator,
    request: &GenerationRequest,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut stream = generator.generate_stream(request).await?;
    let mut content = String::new();
    let mut stdout = std::io::stdout();
    while let Some(delta) = stream.next().await {
        let delta = delta?;
        print!("{}", delta);
        stdout.flush()?;
        content.push_str(&delta);
    }
    println!();
    Ok(content)
}

async fn load_preferences(
    store: Option<&PostStore>,
    user: Option<&str>,
) -> Option<UserPreferences> {
    let (store, user) = match (store, user) {
        (Some(store), Some(user)) => (store, user),
        _ => return None,
    };
    match store.load_preferences(user).await {
        Ok(preferences) => preferences,
        Err(e) => {
            warn!(error = %e, "failed to load user preferences; using defaults");
            None
        }
    }
}

/// Map CLI flags to regeneration options. A preset name needs the storage
/// backend to resolve it; a bare temperature override rides on the
/// user-style mode.
async fn resolve_options(
    cli: &Cli,
    store: Option<&PostStore>,
) -> Result<Option<RegenerationOptions>, Box<dyn std::error::Error>> {
    let mut options = if let Some(name) = &cli.preset {
        let store = store.ok_or("--preset requires the storage backend to be configured")?;
        let presets = store.load_presets().await?;
        let preset = presets
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("Unknown preset: {}", name))?;
        Some(RegenerationOptions::preset(preset))
    } else if let Some(text) = &cli.custom_prompt {
        Some(RegenerationOptions::custom(text.clone()))
    } else if cli.use_style {
        Some(RegenerationOptions::user_style())
    } else {
        None
    };

    if let Some(temperature) = cli.temperature {
        options = Some(
            options
                .unwrap_or_else(RegenerationOptions::user_style)
                .with_temperature(temperature),
        );
    }

    Ok(options)
}

/// Insert a new post, or overwrite the content of the existing one for this
/// PR and user.
async fn save_post(
    store: &PostStore,
    user: &str,
    pr_url: &str,
    title: &str,
    content: &str,
    draft: bool,
) -> Result<(), pull2press::store::StoreError> {
    match store.find_cached(pr_url, user).await? {
        Some(existing) => {
            info!(id = %existing.id, "updating existing post");
            store.update_content(&existing.id, content).await
        }
        None => {
            let saved = store
                .insert_post(&NewPost {
                    pr_url: pr_url.to_string(),
                    title: title.to_string(),
                    content: content.to_string(),
                    user_id: user.to_string(),
                    is_draft: draft,
                })
                .await?;
            info!(id = %saved.id, "saved new post");
            Ok(())
        }
    }
}

/// Built-in sample PR so the whole composition path runs without a GitHub
/// token.
fn sample_pull_request() -> PullRequestData {
    PullRequestData {
        title: "Add new feature".to_string(),
        description: "Adds the feature flag plumbing and the first consumer.".to_string(),
        commits: vec![
            Commit {
                message: "Initial implementation".to_string(),
                sha: "a1b2c3d".to_string(),
                url: "https://github.com/acme/widgets/commit/a1b2c3d".to_string(),
            },
            Commit {
                message: "Add tests".to_string(),
                sha: "e4f5a6b".to_string(),
                url: "https://github.com/acme/widgets/commit/e4f5a6b".to_string(),
            },
        ],
        files: vec![FileChange {
            filename: "src/feature.ts".to_string(),
            status: FileStatus::Modified,
            additions: 50,
            deletions: 10,
            changes: 60,
            patch: None,
        }],
        author: Author {
            login: "alice".to_string(),
            avatar_url: String::new(),
        },
        created_at: Utc::now(),
        updated_at: Utc::now(),
        stats: PrStats {
            total_commits: 2,
            total_files: 1,
            additions: 50,
            deletions: 10,
        },
    }
}
