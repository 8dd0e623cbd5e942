use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Generation backend choice, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    OpenAi,
    Ollama,
    Proxy,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Backend::OpenAi => "openai",
            Backend::Ollama => "ollama",
            Backend::Proxy => "proxy",
        };
        write!(f, "{}", s)
    }
}

/// Top-level configuration loaded from .pull2press.toml, overridden by
/// environment variables. All fields are optional; the tool works with zero
/// config for everything that doesn't need a credential.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    /// Hosted storage backend (posts, presets, preferences)
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    /// Explicit backend choice; inferred from available credentials when
    /// unset.
    pub backend: Option<Backend>,
    /// Model override passed to the chosen backend.
    pub model: Option<String>,
    /// OpenAI API key. If None, falls back to OPENAI_API_KEY env var.
    pub openai_api_key: Option<String>,
    /// Ollama server URL. If None, falls back to OLLAMA_URL env var, then
    /// the local default.
    pub ollama_url: Option<String>,
    /// Hosted proxy function URL. If None, falls back to
    /// PULL2PRESS_PROXY_URL env var.
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    /// Storage backend base URL. Falls back to SUPABASE_URL env var.
    pub url: Option<String>,
    /// Storage backend API key. Falls back to SUPABASE_KEY env var.
    pub key: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from .pull2press.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".pull2press.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence, falls
    /// back to GITHUB_TOKEN.
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone().or_else(|| env_var("GITHUB_TOKEN"))
    }

    pub fn openai_api_key(&self) -> Option<String> {
        self.generation
            .openai_api_key
            .clone()
            .or_else(|| env_var("OPENAI_API_KEY"))
    }

    pub fn ollama_url(&self) -> String {
        self.generation
            .ollama_url
            .clone()
            .or_else(|| env_var("OLLAMA_URL"))
            .unwrap_or_else(|| crate::generate::ollama::DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn proxy_url(&self) -> Option<String> {
        self.generation
            .proxy_url
            .clone()
            .or_else(|| env_var("PULL2PRESS_PROXY_URL"))
    }

    pub fn backend_url(&self) -> Option<String> {
        self.backend.url.clone().or_else(|| env_var("SUPABASE_URL"))
    }

    pub fn backend_key(&self) -> Option<String> {
        self.backend.key.clone().or_else(|| env_var("SUPABASE_KEY"))
    }

    /// The generation backend to use: the explicit config choice, else
    /// inferred from which credentials are present (OpenAI key, then proxy
    /// URL, then the local Ollama default).
    pub fn generation_backend(&self) -> Backend {
        if let Some(backend) = self.generation.backend {
            return backend;
        }
        if self.openai_api_key().is_some() {
            Backend::OpenAi
        } else if self.proxy_url().is_some() {
            Backend::Proxy
        } else {
            Backend::Ollama
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert!(config.generation.backend.is_none());
        assert!(config.backend.url.is_none());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
token = "ghp_test"

[generation]
backend = "openai"
model = "gpt-4o"

[backend]
url = "https://example.supabase.co"
key = "anon-key"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_test"));
        assert_eq!(config.generation.backend, Some(Backend::OpenAi));
        assert_eq!(config.generation.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.backend.key.as_deref(), Some("anon-key"));
    }

    #[test]
    fn test_explicit_backend_wins() {
        let mut config = Config::default();
        config.generation.backend = Some(Backend::Proxy);
        config.generation.openai_api_key = Some("sk-test".to_string());
        assert_eq!(config.generation_backend(), Backend::Proxy);
    }

    #[test]
    fn test_backend_inferred_from_openai_key() {
        let mut config = Config::default();
        config.generation.openai_api_key = Some("sk-test".to_string());
        assert_eq!(config.generation_backend(), Backend::OpenAi);
    }

    #[test]
    fn test_backend_inferred_from_proxy_url() {
        let mut config = Config::default();
        config.generation.proxy_url = Some("https://example.test/generate".to_string());
        assert_eq!(config.generation_backend(), Backend::Proxy);
    }

    #[test]
    fn test_config_token_takes_precedence_over_env() {
        let mut config = Config::default();
        config.github.token = Some("from-config".to_string());
        assert_eq!(config.github_token().as_deref(), Some("from-config"));
    }
}
