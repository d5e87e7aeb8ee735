//! Job lifecycle types.
//!
//! A [`JobResult`] is created per job execution, logged, and discarded; it is
//! never persisted structurally.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ScrapeTweets,
    ScrapeUser,
    ScrapeTrends,
    ScheduledScraping,
    Cleanup,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::ScrapeTweets => "scrape_tweets",
            JobKind::ScrapeUser => "scrape_user",
            JobKind::ScrapeTrends => "scrape_trends",
            JobKind::ScheduledScraping => "scheduled_scraping",
            JobKind::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// One concrete scraping backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Open-source HTML mirror scraper; no platform credentials required.
    Nitter,
    /// Official authenticated API client.
    TwitterApi,
    /// Deterministic synthetic generator for tests and degraded mode.
    Mock,
}

impl BackendKind {
    /// Parse a configuration string into a backend kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "nitter" | "open-source" | "opensource" => Some(BackendKind::Nitter),
            "twitter-api" | "twitter_api" | "official" => Some(BackendKind::TwitterApi),
            "mock" => Some(BackendKind::Mock),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Nitter => "nitter",
            BackendKind::TwitterApi => "twitter-api",
            BackendKind::Mock => "mock",
        };
        f.write_str(s)
    }
}

/// State machine per job instance.
///
/// `Pending -> Running -> {Succeeded, Failed, Retrying}`, with
/// `Retrying -> Running` when the backoff interval elapses. `Skipped` is the
/// terminal state for an invocation coalesced against a concurrent duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Retrying => "retrying",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one job execution.
///
/// Fetched and normalized are tracked separately: items the provider returned
/// versus items that survived normalization into record models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub kind: JobKind,
    pub state: JobState,

    /// Backend that ultimately served the request, when one did.
    pub backend: Option<BackendKind>,

    /// Raw items returned by the serving backend.
    pub items_fetched: usize,

    /// Items that survived normalization.
    pub items_normalized: usize,

    /// Records newly inserted by the repository.
    pub inserted: usize,

    /// Records updated in place by the repository.
    pub updated: usize,

    /// Records removed (cleanup jobs only).
    pub deleted: u64,

    /// Orchestrator-level retries performed.
    pub retries: u32,

    /// Error kind, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock duration of the whole invocation.
    pub duration_ms: u64,
}

impl JobResult {
    fn base(kind: JobKind, state: JobState) -> Self {
        Self {
            kind,
            state,
            backend: None,
            items_fetched: 0,
            items_normalized: 0,
            inserted: 0,
            updated: 0,
            deleted: 0,
            retries: 0,
            error: None,
            duration_ms: 0,
        }
    }

    /// A coalesced invocation: an identical job already holds the key.
    pub fn skipped(kind: JobKind) -> Self {
        Self::base(kind, JobState::Skipped)
    }

    /// A failed invocation with the given error kind.
    pub fn failed(kind: JobKind, error: impl Into<String>) -> Self {
        let mut result = Self::base(kind, JobState::Failed);
        result.error = Some(error.into());
        result
    }

    /// A successful invocation; counts are filled in by the caller.
    pub fn succeeded(kind: JobKind) -> Self {
        Self::base(kind, JobState::Succeeded)
    }

    /// Emit the one-line summary the orchestrator logs per job.
    pub fn log(&self) {
        let backend = self
            .backend
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        match self.state {
            JobState::Succeeded => log::info!(
                "job {} {}: backend={} fetched={} normalized={} inserted={} updated={} deleted={} retries={} ({}ms)",
                self.kind,
                self.state,
                backend,
                self.items_fetched,
                self.items_normalized,
                self.inserted,
                self.updated,
                self.deleted,
                self.retries,
                self.duration_ms
            ),
            JobState::Skipped => log::info!(
                "job {} skipped: identical job already running",
                self.kind
            ),
            _ => log::error!(
                "job {} {}: backend={} error={} retries={} ({}ms)",
                self.kind,
                self.state,
                backend,
                self.error.as_deref().unwrap_or("unknown"),
                self.retries,
                self.duration_ms
            ),
        }
    }
}
