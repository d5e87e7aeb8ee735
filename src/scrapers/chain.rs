// src/scrapers/chain.rs

//! Backend selector and fallback chain.
//!
//! Tries configured variants in preference order. Retryable failures
//! (`RateLimited`, `TransientNetwork`) are retried on the current variant
//! under its own budget; `AuthFailure` and `BackendContract` skip to the
//! next variant immediately. The per-backend retry policy and the
//! orchestrator's job-level retry are deliberately separate loops.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{AppError, Result, ScrapeError, ScrapeResult};
use crate::models::{BackendKind, Config, User};
use crate::retry::RetryPolicy;
use crate::scrapers::{self, Scraper, ScraperBackend, TrendPage, TweetPage};

/// One collection request, tagged by operation.
#[derive(Debug, Clone)]
pub enum FetchOp {
    Tweets { query: String, limit: usize },
    User { username: String },
    Trends { region: String },
}

impl std::fmt::Display for FetchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchOp::Tweets { query, limit } => write!(f, "tweets(\"{query}\", limit={limit})"),
            FetchOp::User { username } => write!(f, "user(\"{username}\")"),
            FetchOp::Trends { region } => write!(f, "trends(\"{region}\")"),
        }
    }
}

/// Normalized result of one request, tagged to match the operation.
#[derive(Debug)]
pub enum Batch {
    Tweets(TweetPage),
    User(Option<User>),
    Trends(TrendPage),
}

impl Batch {
    /// Raw items the serving backend returned.
    pub fn fetched(&self) -> usize {
        match self {
            Batch::Tweets(p) => p.fetched,
            Batch::User(u) => usize::from(u.is_some()),
            Batch::Trends(p) => p.fetched,
        }
    }

    /// Items that survived normalization.
    pub fn normalized(&self) -> usize {
        match self {
            Batch::Tweets(p) => p.tweets.len(),
            Batch::User(u) => usize::from(u.is_some()),
            Batch::Trends(p) => p.trends.len(),
        }
    }

    /// The empty batch for an operation; `NotFound` resolves to this.
    fn empty_for(op: &FetchOp) -> Self {
        match op {
            FetchOp::Tweets { .. } => Batch::Tweets(TweetPage::default()),
            FetchOp::User { .. } => Batch::User(None),
            FetchOp::Trends { .. } => Batch::Trends(TrendPage::default()),
        }
    }
}

/// Process-wide rate-limit state, shared by every job using the chain.
///
/// A backend that reports `RateLimited` is put on cooldown; the chain skips
/// cooling backends instead of burning their retry budgets.
#[derive(Debug, Default)]
pub struct RateGate {
    cooldowns: Mutex<HashMap<BackendKind, Instant>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining cooldown for a backend, if any.
    pub fn cooling(&self, kind: BackendKind) -> Option<Duration> {
        let mut cooldowns = self.cooldowns.lock().expect("rate gate poisoned");
        match cooldowns.get(&kind) {
            Some(until) => {
                let now = Instant::now();
                if *until > now {
                    Some(*until - now)
                } else {
                    cooldowns.remove(&kind);
                    None
                }
            }
            None => None,
        }
    }

    /// Put a backend on cooldown. Keeps the later deadline if one exists.
    pub fn trip(&self, kind: BackendKind, cooldown: Duration) {
        let mut cooldowns = self.cooldowns.lock().expect("rate gate poisoned");
        let until = Instant::now() + cooldown;
        let entry = cooldowns.entry(kind).or_insert(until);
        if *entry < until {
            *entry = until;
        }
    }
}

/// Ordered chain of scraper backends with per-backend retry.
pub struct FallbackChain {
    backends: Vec<ScraperBackend>,
    retry: RetryPolicy,
    gate: RateGate,
    cooldown: Duration,
}

impl FallbackChain {
    pub fn new(backends: Vec<ScraperBackend>, retry: RetryPolicy, cooldown: Duration) -> Self {
        Self {
            backends,
            retry,
            gate: RateGate::new(),
            cooldown,
        }
    }

    /// Build the chain from configuration, applying the capability check.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backends = scrapers::build_backends(config)?;
        Ok(Self::new(
            backends,
            RetryPolicy::for_backend(&config.backends),
            Duration::from_secs(config.backends.rate_limit_cooldown_secs),
        ))
    }

    /// The variants currently in the chain, in preference order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub async fn fetch_tweets(&self, query: &str, limit: usize) -> Result<(TweetPage, BackendKind)> {
        let op = FetchOp::Tweets {
            query: query.to_string(),
            limit,
        };
        match self.execute(&op).await? {
            (Batch::Tweets(page), backend) => Ok((page, backend)),
            _ => unreachable!("tweets op yields a tweets batch"),
        }
    }

    pub async fn fetch_user(&self, username: &str) -> Result<(Option<User>, BackendKind)> {
        let op = FetchOp::User {
            username: username.to_string(),
        };
        match self.execute(&op).await? {
            (Batch::User(user), backend) => Ok((user, backend)),
            _ => unreachable!("user op yields a user batch"),
        }
    }

    pub async fn fetch_trends(&self, region: &str) -> Result<(TrendPage, BackendKind)> {
        let op = FetchOp::Trends {
            region: region.to_string(),
        };
        match self.execute(&op).await? {
            (Batch::Trends(page), backend) => Ok((page, backend)),
            _ => unreachable!("trends op yields a trends batch"),
        }
    }

    /// Run one request through the chain. Returns the batch and the variant
    /// that served it, or `AllBackendsExhausted` with the last error seen
    /// per attempted variant.
    pub(crate) async fn execute(&self, op: &FetchOp) -> Result<(Batch, BackendKind)> {
        let mut attempts: Vec<(BackendKind, ScrapeError)> = Vec::new();

        for backend in &self.backends {
            let kind = backend.kind();

            if let Some(remaining) = self.gate.cooling(kind) {
                log::debug!("backend {kind} cooling for {remaining:?}, skipping");
                attempts.push((
                    kind,
                    ScrapeError::RateLimited {
                        retry_after: Some(remaining),
                    },
                ));
                continue;
            }

            match self.attempt(backend, op).await {
                Ok(batch) => {
                    log::info!(
                        "{op} served by {kind}: {}/{} items normalized",
                        batch.normalized(),
                        batch.fetched()
                    );
                    return Ok((batch, kind));
                }
                Err(ScrapeError::NotFound) => {
                    log::debug!("{op} not found on {kind}; empty result");
                    return Ok((Batch::empty_for(op), kind));
                }
                Err(e) => {
                    log::warn!("{op} failed on {kind} ({e}); falling through");
                    attempts.push((kind, e));
                }
            }
        }

        log::error!("{op} exhausted all {} backends", attempts.len());
        Err(AppError::AllBackendsExhausted { attempts })
    }

    /// Retry a single backend within its budget. `AuthFailure` and
    /// `BackendContract` abort immediately; the caller moves on.
    async fn attempt(&self, backend: &ScraperBackend, op: &FetchOp) -> ScrapeResult<Batch> {
        let kind = backend.kind();
        let mut attempt = 0u32;

        loop {
            let result = match op {
                FetchOp::Tweets { query, limit } => backend
                    .fetch_tweets(query, *limit)
                    .await
                    .map(Batch::Tweets),
                FetchOp::User { username } => {
                    backend.fetch_user(username).await.map(|u| Batch::User(Some(u)))
                }
                FetchOp::Trends { region } => {
                    backend.fetch_trends(region).await.map(Batch::Trends)
                }
            };

            let err = match result {
                Ok(batch) => return Ok(batch),
                Err(e) => e,
            };

            if let ScrapeError::RateLimited { retry_after } = &err {
                let cooldown = retry_after.map_or(self.cooldown, |ra| ra.max(self.cooldown));
                self.gate.trip(kind, cooldown);
            }

            if !err.is_retryable() || attempt >= self.retry.max_retries {
                return Err(err);
            }

            let mut delay = self.retry.delay_for(attempt);
            if let ScrapeError::RateLimited {
                retry_after: Some(ra),
            } = &err
            {
                delay = delay.max(*ra);
            }

            attempt += 1;
            log::warn!(
                "backend {kind} {op}: {err}; retry {attempt}/{} in {delay:?}",
                self.retry.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }
}
