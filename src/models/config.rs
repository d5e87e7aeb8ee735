//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::BackendKind;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client and scraping behavior settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Backend selection and fallback settings
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Orchestrator retry and timeout settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Periodic scraping targets and intervals
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Record retention settings
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Storage backend settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scraper.user_agent.trim().is_empty() {
            return Err(AppError::validation("scraper.user_agent is empty"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        if self.scraper.max_concurrent == 0 {
            return Err(AppError::validation("scraper.max_concurrent must be > 0"));
        }
        if self.backends.order.is_empty() {
            return Err(AppError::validation("backends.order is empty"));
        }
        for name in &self.backends.order {
            if BackendKind::parse(name).is_none() {
                return Err(AppError::validation(format!(
                    "backends.order contains unknown backend '{name}'"
                )));
            }
        }
        if self.jobs.timeout_secs == 0 {
            return Err(AppError::validation("jobs.timeout_secs must be > 0"));
        }
        if self.jobs.backoff_multiplier < 1.0 {
            return Err(AppError::validation(
                "jobs.backoff_multiplier must be >= 1.0",
            ));
        }
        if self.schedule.tweet_limit == 0 {
            return Err(AppError::validation("schedule.tweet_limit must be > 0"));
        }
        if self.retention.days <= 0 {
            return Err(AppError::validation("retention.days must be > 0"));
        }
        Ok(())
    }

    /// The configured fallback order, parsed. Call after [`validate`].
    pub fn fallback_order(&self) -> Vec<BackendKind> {
        self.backends
            .order
            .iter()
            .filter_map(|s| BackendKind::parse(s))
            .collect()
    }
}

/// HTTP client and scraping behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent jobs during scheduled scraping
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Backend selection and fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Fallback order, tried first to last
    #[serde(default = "defaults::backend_order")]
    pub order: Vec<String>,

    /// Base URL of the Nitter-style mirror
    #[serde(default = "defaults::nitter_base_url")]
    pub nitter_base_url: String,

    /// Base URL of the official API
    #[serde(default = "defaults::api_base_url")]
    pub api_base_url: String,

    /// Bearer token for the official API; falls back to the
    /// `TWITTER_BEARER_TOKEN` environment variable when unset
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Retries per backend before falling through to the next variant
    #[serde(default = "defaults::backend_max_retries")]
    pub max_retries: u32,

    /// Initial per-backend backoff in milliseconds
    #[serde(default = "defaults::backend_backoff")]
    pub initial_backoff_ms: u64,

    /// How long a rate-limited backend is skipped by every job
    #[serde(default = "defaults::cooldown")]
    pub rate_limit_cooldown_secs: u64,
}

impl BackendsConfig {
    /// Resolve the bearer token from config or environment.
    pub fn bearer_token(&self) -> Option<String> {
        self.bearer_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("TWITTER_BEARER_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            order: defaults::backend_order(),
            nitter_base_url: defaults::nitter_base_url(),
            api_base_url: defaults::api_base_url(),
            bearer_token: None,
            max_retries: defaults::backend_max_retries(),
            initial_backoff_ms: defaults::backend_backoff(),
            rate_limit_cooldown_secs: defaults::cooldown(),
        }
    }
}

/// Orchestrator retry and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Maximum orchestrator-level retries per job
    #[serde(default = "defaults::job_max_retries")]
    pub max_retries: u32,

    /// Initial orchestrator backoff in milliseconds
    #[serde(default = "defaults::job_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "defaults::job_max_backoff")]
    pub max_backoff_ms: u64,

    /// Exponential backoff multiplier
    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Apply random jitter to backoff delays
    #[serde(default = "defaults::jitter")]
    pub jitter: bool,

    /// Wall-clock budget per job in seconds, backoff waits included
    #[serde(default = "defaults::job_timeout")]
    pub timeout_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::job_max_retries(),
            initial_backoff_ms: defaults::job_backoff(),
            max_backoff_ms: defaults::job_max_backoff(),
            backoff_multiplier: defaults::backoff_multiplier(),
            jitter: defaults::jitter(),
            timeout_secs: defaults::job_timeout(),
        }
    }
}

/// Periodic scraping targets and intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between scheduled scraping sweeps
    #[serde(default = "defaults::scrape_interval")]
    pub scrape_interval_secs: u64,

    /// Seconds between cleanup runs
    #[serde(default = "defaults::cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Search queries to refresh every sweep
    #[serde(default)]
    pub queries: Vec<String>,

    /// Usernames to refresh every sweep
    #[serde(default)]
    pub users: Vec<String>,

    /// Trend regions to refresh every sweep
    #[serde(default = "defaults::regions")]
    pub regions: Vec<String>,

    /// Tweets requested per query
    #[serde(default = "defaults::tweet_limit")]
    pub tweet_limit: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            scrape_interval_secs: defaults::scrape_interval(),
            cleanup_interval_secs: defaults::cleanup_interval(),
            queries: Vec::new(),
            users: Vec::new(),
            regions: defaults::regions(),
            tweet_limit: defaults::tweet_limit(),
        }
    }
}

/// Record retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Age in days beyond which persisted records are deleted
    #[serde(default = "defaults::retention_days")]
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: defaults::retention_days(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Postgres connection URL; in-memory storage is used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Connection pool size
    #[serde(default = "defaults::max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: defaults::max_connections(),
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "defaults::api_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "defaults::api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: defaults::api_host(),
            port: defaults::api_port(),
        }
    }
}

mod defaults {
    // Scraper defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; birdwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Backend defaults
    pub fn backend_order() -> Vec<String> {
        vec!["twitter-api".into(), "nitter".into(), "mock".into()]
    }
    pub fn nitter_base_url() -> String {
        "https://nitter.net".into()
    }
    pub fn api_base_url() -> String {
        "https://api.twitter.com/2".into()
    }
    pub fn backend_max_retries() -> u32 {
        2
    }
    pub fn backend_backoff() -> u64 {
        500
    }
    pub fn cooldown() -> u64 {
        300
    }

    // Job defaults
    pub fn job_max_retries() -> u32 {
        3
    }
    pub fn job_backoff() -> u64 {
        1_000
    }
    pub fn job_max_backoff() -> u64 {
        60_000
    }
    pub fn backoff_multiplier() -> f64 {
        2.0
    }
    pub fn jitter() -> bool {
        true
    }
    pub fn job_timeout() -> u64 {
        120
    }

    // Schedule defaults
    pub fn scrape_interval() -> u64 {
        900
    }
    pub fn cleanup_interval() -> u64 {
        86_400
    }
    pub fn regions() -> Vec<String> {
        vec!["worldwide".into()]
    }
    pub fn tweet_limit() -> usize {
        50
    }

    // Retention defaults
    pub fn retention_days() -> i64 {
        30
    }

    // Storage defaults
    pub fn max_connections() -> u32 {
        5
    }

    // API defaults
    pub fn api_host() -> String {
        "0.0.0.0".into()
    }
    pub fn api_port() -> u16 {
        8000
    }
}
