//! Configuration management for pagesmith.
//!
//! Configuration can be set via environment variables (a `.env` file in the
//! working directory is loaded first, see `main`):
//! - `SECRET_KEY` - Required. Shared secret every task submission must carry.
//! - `GITHUB_TOKEN` - Required when `REPO_BACKEND=github`. Token for the GitHub REST API.
//! - `AI_API_KEY` - Optional at startup. Each generation fails without it.
//! - `LLM_BASE_URL` - Optional. Chat-completion base URL. Defaults to `https://aipipe.org/openai/v1`.
//! - `LLM_MODEL` - Optional. Model identifier. Defaults to `gpt-4o-mini`.
//! - `LLM_TIMEOUT_SECS` - Optional. Per-request LLM timeout. Defaults to `300`.
//! - `GITHUB_API_URL` - Optional. Defaults to `https://api.github.com`.
//! - `GITHUB_TIMEOUT_SECS` - Optional. Per-request GitHub timeout. Defaults to `60`.
//! - `REPO_BACKEND` - Optional. `github` or `memory`. Defaults to `github`.
//! - `README_STYLE` - Optional. `brief` or `full`. Defaults to `full`.
//! - `NOTIFY_SETTLE_SECS` - Optional. Pause between publish and notify. Defaults to `60`.
//! - `NOTIFY_MAX_ATTEMPTS` - Optional. Defaults to `5`.
//! - `NOTIFY_INITIAL_DELAY_SECS` - Optional. First backoff delay. Defaults to `1`.
//! - `NOTIFY_TIMEOUT_SECS` - Optional. Per-attempt timeout. Defaults to `10`.
//! - `HOST` - Optional. Server host. Defaults to `0.0.0.0`.
//! - `PORT` - Optional. Server port. Defaults to `8000`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::generation::DocStyle;
use crate::notify::RetryPolicy;

pub const DEFAULT_LLM_BASE_URL: &str = "https://aipipe.org/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which source-hosting backend the publisher talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoBackend {
    /// GitHub REST API
    GitHub,
    /// Non-persistent in-process store (local runs)
    Memory,
}

impl FromStr for RepoBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(format!("expected `github` or `memory`, got: {}", other)),
        }
    }
}

/// LLM endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key; checked at generation time, not at startup
    pub api_key: Option<String>,

    /// Base URL of the chat-completion API (without `/chat/completions`)
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Source-hosting configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Personal access token
    pub token: Option<String>,

    /// REST API base URL
    pub api_url: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_GITHUB_API_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret task submissions are checked against
    pub shared_secret: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    pub llm: LlmConfig,

    pub github: GitHubConfig,

    /// Repository backend used by the publisher
    pub repo_backend: RepoBackend,

    /// README template used in prompts and in the normalizer fallback
    pub doc_style: DocStyle,

    /// Pause between a successful publish and the first notification attempt
    pub notify_settle: Duration,

    /// Evaluation callback retry policy
    pub notify_retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `SECRET_KEY` is not set, or if
    /// `GITHUB_TOKEN` is not set while the GitHub backend is selected.
    pub fn from_env() -> Result<Self, ConfigError> {
        let shared_secret = std::env::var("SECRET_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("SECRET_KEY".to_string()))?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_env("PORT", 8000u16)?;

        let llm = LlmConfig {
            api_key: non_empty_env("AI_API_KEY"),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string()),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 300u64)?),
        };

        let repo_backend = parse_env("REPO_BACKEND", RepoBackend::GitHub)?;

        let github = GitHubConfig {
            token: non_empty_env("GITHUB_TOKEN"),
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| DEFAULT_GITHUB_API_URL.to_string()),
            timeout: Duration::from_secs(parse_env("GITHUB_TIMEOUT_SECS", 60u64)?),
        };

        if repo_backend == RepoBackend::GitHub && github.token.is_none() {
            return Err(ConfigError::MissingEnvVar("GITHUB_TOKEN".to_string()));
        }

        let doc_style = parse_env("README_STYLE", DocStyle::Full)?;

        let notify_settle = Duration::from_secs(parse_env("NOTIFY_SETTLE_SECS", 60u64)?);
        let max_attempts = parse_env("NOTIFY_MAX_ATTEMPTS", 5u32)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "NOTIFY_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let notify_retry = RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_secs(parse_env("NOTIFY_INITIAL_DELAY_SECS", 1u64)?),
            attempt_timeout: Duration::from_secs(parse_env("NOTIFY_TIMEOUT_SECS", 10u64)?),
        };

        Ok(Self {
            shared_secret,
            host,
            port,
            llm,
            github,
            repo_backend,
            doc_style,
            notify_settle,
            notify_retry,
        })
    }

    /// Create a config with custom values (useful for testing).
    ///
    /// Uses the in-memory backend and no settle pause.
    pub fn new(shared_secret: String, llm_api_key: Option<String>) -> Self {
        Self {
            shared_secret,
            host: "127.0.0.1".to_string(),
            port: 8000,
            llm: LlmConfig {
                api_key: llm_api_key,
                ..LlmConfig::default()
            },
            github: GitHubConfig::default(),
            repo_backend: RepoBackend::Memory,
            doc_style: DocStyle::Full,
            notify_settle: Duration::ZERO,
            notify_retry: RetryPolicy::default(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
