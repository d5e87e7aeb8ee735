// src/error.rs

//! Unified error handling for the collection service.
//!
//! Two layers: [`ScrapeError`] is the backend-level taxonomy the fallback
//! chain routes on; [`AppError`] is what jobs and the HTTP surface see.

use std::time::Duration;

use thiserror::Error;

use crate::models::BackendKind;

/// Result type alias for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for backend-level scrape operations.
pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

/// Errors a single scraper backend can produce.
#[derive(Error, Debug, Clone)]
pub enum ScrapeError {
    /// Provider rate limit hit; caller should back off before retrying.
    #[error("rate limited{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Credentials missing or rejected; fatal for this backend.
    #[error("auth failure: {0}")]
    AuthFailure(String),

    /// The requested entity does not exist. Not an error for job purposes.
    #[error("not found")]
    NotFound,

    /// Network-level failure (timeout, connect, reset); retryable with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Provider response shape broke the expected contract (e.g. every item
    /// in a batch failed normalization).
    #[error("backend contract error: {0}")]
    BackendContract(String),
}

impl ScrapeError {
    /// Whether the same backend may be retried after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::RateLimited { .. } | ScrapeError::TransientNetwork(_)
        )
    }

    /// Whether the fallback chain should skip straight to the next backend.
    pub fn skips_backend(&self) -> bool {
        matches!(
            self,
            ScrapeError::AuthFailure(_) | ScrapeError::BackendContract(_)
        )
    }

    /// Short stable name for logging and job results.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::RateLimited { .. } => "rate_limited",
            ScrapeError::AuthFailure(_) => "auth_failure",
            ScrapeError::NotFound => "not_found",
            ScrapeError::TransientNetwork(_) => "transient_network",
            ScrapeError::BackendContract(_) => "backend_contract",
        }
    }

    /// Classify a reqwest transport error. Status-code mapping is done by
    /// the backend that saw the response; this only covers I/O failures.
    pub fn from_transport(err: reqwest::Error) -> Self {
        ScrapeError::TransientNetwork(err.to_string())
    }
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Backend-level error that escaped the fallback chain unwrapped
    /// (construction-time failures, single-backend mode).
    #[error("scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    /// Every configured backend exhausted its retry budget. Carries the last
    /// error observed per attempted variant for diagnostics.
    #[error("all backends exhausted ({} attempted)", attempts.len())]
    AllBackendsExhausted {
        attempts: Vec<(BackendKind, ScrapeError)>,
    },

    /// The job exceeded its configured wall-clock budget.
    #[error("job timed out after {0:?}")]
    JobTimeout(Duration),

    /// Storage-layer failure; non-retryable within the current job.
    #[error("repository error: {0}")]
    Repository(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP client failed outside a scrape operation
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a repository error.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository(message.into())
    }

    /// Short stable name for logging and job results.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Scrape(e) => e.kind(),
            AppError::AllBackendsExhausted { .. } => "all_backends_exhausted",
            AppError::JobTimeout(_) => "job_timeout",
            AppError::Repository(_) => "repository",
            AppError::Io(_) => "io",
            AppError::Json(_) => "json",
            AppError::Toml(_) => "toml",
            AppError::Http(_) => "http",
            AppError::Config(_) => "config",
            AppError::Validation(_) => "validation",
        }
    }

    /// Whether the orchestrator may re-enter `Retrying` for this error.
    ///
    /// Exhaustion is retryable only when at least one variant failed with a
    /// retryable class; auth-only exhaustion is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Scrape(e) => e.is_retryable(),
            AppError::AllBackendsExhausted { attempts } => {
                attempts.iter().any(|(_, e)| e.is_retryable())
            }
            _ => false,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Repository(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(ScrapeError::RateLimited { retry_after: None }.is_retryable());
        assert!(ScrapeError::TransientNetwork("reset".into()).is_retryable());
        assert!(!ScrapeError::AuthFailure("no token".into()).is_retryable());
        assert!(!ScrapeError::NotFound.is_retryable());
    }

    #[test]
    fn skip_classes() {
        assert!(ScrapeError::AuthFailure("bad token".into()).skips_backend());
        assert!(ScrapeError::BackendContract("shape".into()).skips_backend());
        assert!(!ScrapeError::RateLimited { retry_after: None }.skips_backend());
    }

    #[test]
    fn exhaustion_retryable_only_with_retryable_cause() {
        let retryable = AppError::AllBackendsExhausted {
            attempts: vec![
                (BackendKind::TwitterApi, ScrapeError::AuthFailure("x".into())),
                (
                    BackendKind::Nitter,
                    ScrapeError::TransientNetwork("y".into()),
                ),
            ],
        };
        assert!(retryable.is_retryable());

        let fatal = AppError::AllBackendsExhausted {
            attempts: vec![(BackendKind::TwitterApi, ScrapeError::AuthFailure("x".into()))],
        };
        assert!(!fatal.is_retryable());
    }
}
