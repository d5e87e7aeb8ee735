// src/tasks/mod.rs

//! Task orchestration.
//!
//! Entry points for on-demand and periodic collection jobs. Each job runs a
//! state machine (`Pending -> Running -> {Succeeded, Failed, Retrying}`)
//! with orchestrator-level backoff applied only after the fallback chain has
//! exhausted its own per-backend budget. Duplicate invocations for the same
//! identity key are coalesced, never run twice.

mod locks;
pub mod scheduler;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{BackendKind, Config, JobKind, JobResult, JobState};
use crate::retry::RetryPolicy;
use crate::scrapers::{Batch, FallbackChain, FetchOp};
use crate::storage::{EntityKind, Repository, UpsertOutcome};
use crate::utils::normalize_username;

use locks::KeyedLocks;

/// What one successful collection pass produced.
struct Collected {
    fetched: usize,
    normalized: usize,
    inserted: usize,
    updated: usize,
    backend: BackendKind,
}

/// Runs collection and cleanup jobs against the chain and the repository.
pub struct Orchestrator {
    config: Arc<Config>,
    chain: FallbackChain,
    repo: Arc<dyn Repository>,
    locks: KeyedLocks,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, chain: FallbackChain, repo: Arc<dyn Repository>) -> Self {
        let retry = RetryPolicy::for_jobs(&config.jobs);
        Self {
            config,
            chain,
            repo,
            locks: KeyedLocks::new(),
            retry,
        }
    }

    /// Build the orchestrator with a chain derived from configuration.
    pub fn from_config(config: Arc<Config>, repo: Arc<dyn Repository>) -> Result<Self> {
        let chain = FallbackChain::from_config(&config)?;
        Ok(Self::new(config, chain, repo))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Collect tweets matching `query` and upsert them.
    pub async fn run_scrape_tweets(&self, query: &str, limit: usize) -> JobResult {
        let key = format!("tweets:{query}");
        let op = FetchOp::Tweets {
            query: query.to_string(),
            limit,
        };
        self.run_collection(JobKind::ScrapeTweets, &key, op).await
    }

    /// Collect one user profile and upsert it.
    pub async fn run_scrape_user(&self, username: &str) -> JobResult {
        let username = normalize_username(username);
        let key = format!("user:{username}");
        let op = FetchOp::User { username };
        self.run_collection(JobKind::ScrapeUser, &key, op).await
    }

    /// Collect trends for `region` and upsert them.
    pub async fn run_scrape_trends(&self, region: &str) -> JobResult {
        let key = format!("trends:{}", region.to_lowercase());
        let op = FetchOp::Trends {
            region: region.to_string(),
        };
        self.run_collection(JobKind::ScrapeTrends, &key, op).await
    }

    /// Refresh every configured query, user, and region with bounded
    /// concurrency. Individual target failures are logged and counted but do
    /// not abort the sweep.
    pub async fn run_scheduled_scraping(&self) -> JobResult {
        let started = Instant::now();
        let Some(_guard) = self.locks.try_acquire("scheduled") else {
            let result = JobResult::skipped(JobKind::ScheduledScraping);
            result.log();
            return result;
        };

        let schedule = &self.config.schedule;
        let mut targets: Vec<(JobKind, String, FetchOp)> = Vec::new();
        for query in &schedule.queries {
            targets.push((
                JobKind::ScrapeTweets,
                format!("tweets:{query}"),
                FetchOp::Tweets {
                    query: query.clone(),
                    limit: schedule.tweet_limit,
                },
            ));
        }
        for user in &schedule.users {
            let username = normalize_username(user);
            targets.push((
                JobKind::ScrapeUser,
                format!("user:{username}"),
                FetchOp::User { username },
            ));
        }
        for region in &schedule.regions {
            targets.push((
                JobKind::ScrapeTrends,
                format!("trends:{}", region.to_lowercase()),
                FetchOp::Trends {
                    region: region.clone(),
                },
            ));
        }

        let total = targets.len();
        log::info!("scheduled scraping: {total} targets");

        let results: Vec<JobResult> = stream::iter(targets)
            .map(|(kind, key, op)| async move { self.run_collection(kind, &key, op).await })
            .buffer_unordered(self.config.scraper.max_concurrent.max(1))
            .collect()
            .await;

        let mut result = JobResult::succeeded(JobKind::ScheduledScraping);
        let mut failed = 0usize;
        for sub in &results {
            result.items_fetched += sub.items_fetched;
            result.items_normalized += sub.items_normalized;
            result.inserted += sub.inserted;
            result.updated += sub.updated;
            if sub.state == JobState::Failed {
                failed += 1;
            }
        }
        if failed > 0 {
            result.error = Some(format!("{failed}/{total} targets failed"));
            if failed == total && total > 0 {
                result.state = JobState::Failed;
            }
        }
        result.duration_ms = started.elapsed().as_millis() as u64;
        result.log();
        result
    }

    /// Delete records older than the retention window. Safe to run
    /// concurrently with ingestion; relies on the repository's per-record
    /// atomicity, no orchestrator-level locking of the data.
    pub async fn run_cleanup(&self, retention_days: Option<i64>) -> JobResult {
        let started = Instant::now();
        let Some(_guard) = self.locks.try_acquire("cleanup") else {
            let result = JobResult::skipped(JobKind::Cleanup);
            result.log();
            return result;
        };

        let days = retention_days.unwrap_or(self.config.retention.days);
        let cutoff = Utc::now() - chrono::Duration::days(days);
        log::info!("cleanup: deleting records older than {cutoff} ({days}d retention)");

        let mut deleted = 0u64;
        for entity in EntityKind::ALL {
            match self.repo.delete_older_than(entity, cutoff).await {
                Ok(count) => {
                    if count > 0 {
                        log::info!("cleanup: removed {count} {entity}");
                    }
                    deleted += count;
                }
                Err(e) => {
                    log::error!("cleanup failed on {entity}: {e}");
                    let mut result = JobResult::failed(JobKind::Cleanup, e.kind());
                    result.deleted = deleted;
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    result.log();
                    return result;
                }
            }
        }

        let mut result = JobResult::succeeded(JobKind::Cleanup);
        result.deleted = deleted;
        result.duration_ms = started.elapsed().as_millis() as u64;
        result.log();
        result
    }

    /// Run one collection job to completion: lock the key, then loop
    /// fetch-and-persist under the job timeout, re-entering `Retrying` only
    /// for retryable exhaustion.
    async fn run_collection(&self, kind: JobKind, key: &str, op: FetchOp) -> JobResult {
        let started = Instant::now();

        let Some(_guard) = self.locks.try_acquire(key) else {
            let result = JobResult::skipped(kind);
            result.log();
            return result;
        };

        let budget = Duration::from_secs(self.config.jobs.timeout_secs);
        let deadline = started + budget;
        let mut retries = 0u32;

        log::debug!("job {kind} {} -> {} ({op})", JobState::Pending, JobState::Running);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.finish_timeout(kind, budget, retries, started);
            }

            // The timeout drops the in-flight future, cancelling any pending
            // backend call rather than orphaning it.
            let attempt = tokio::time::timeout(remaining, self.collect_once(&op)).await;

            let err = match attempt {
                Err(_) => return self.finish_timeout(kind, budget, retries, started),
                Ok(Ok(collected)) => {
                    let mut result = JobResult::succeeded(kind);
                    result.backend = Some(collected.backend);
                    result.items_fetched = collected.fetched;
                    result.items_normalized = collected.normalized;
                    result.inserted = collected.inserted;
                    result.updated = collected.updated;
                    result.retries = retries;
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    result.log();
                    return result;
                }
                Ok(Err(e)) => e,
            };

            if let AppError::AllBackendsExhausted { attempts } = &err {
                for (backend, cause) in attempts {
                    log::warn!("job {kind}: backend {backend} last error: {cause}");
                }
            }

            if !err.is_retryable() || retries >= self.retry.max_retries {
                log::error!("job {kind} failed after {retries} retries: {err}");
                let mut result = JobResult::failed(kind, err.kind());
                result.retries = retries;
                result.duration_ms = started.elapsed().as_millis() as u64;
                result.log();
                return result;
            }

            let delay = self.retry.delay_for(retries);
            retries += 1;

            if Instant::now() + delay >= deadline {
                return self.finish_timeout(kind, budget, retries, started);
            }

            log::warn!(
                "job {kind} {} -> {}: {err}; retry {retries}/{} in {delay:?}",
                JobState::Running,
                JobState::Retrying,
                self.retry.max_retries
            );
            tokio::time::sleep(delay).await;
            log::debug!("job {kind} {} -> {}", JobState::Retrying, JobState::Running);
        }
    }

    fn finish_timeout(
        &self,
        kind: JobKind,
        budget: Duration,
        retries: u32,
        started: Instant,
    ) -> JobResult {
        let err = AppError::JobTimeout(budget);
        log::error!("job {kind} failed: {err}");
        let mut result = JobResult::failed(kind, err.kind());
        result.retries = retries;
        result.duration_ms = started.elapsed().as_millis() as u64;
        result.log();
        result
    }

    /// One fetch-and-persist pass through the chain.
    async fn collect_once(&self, op: &FetchOp) -> Result<Collected> {
        let (batch, backend) = self.chain.execute(op).await?;
        let (inserted, updated) = self.persist(&batch).await?;
        Ok(Collected {
            fetched: batch.fetched(),
            normalized: batch.normalized(),
            inserted,
            updated,
            backend,
        })
    }

    /// Upsert every record in the batch, one statement at a time; the shared
    /// pool is never held across more than one upsert.
    async fn persist(&self, batch: &Batch) -> Result<(usize, usize)> {
        let mut inserted = 0usize;
        let mut updated = 0usize;

        match batch {
            Batch::Tweets(page) => {
                for tweet in &page.tweets {
                    match self.repo.upsert_tweet(tweet).await? {
                        UpsertOutcome::Inserted => inserted += 1,
                        UpsertOutcome::Updated => updated += 1,
                    }
                }
            }
            Batch::User(Some(user)) => match self.repo.upsert_user(user).await? {
                UpsertOutcome::Inserted => inserted += 1,
                UpsertOutcome::Updated => updated += 1,
            },
            Batch::User(None) => {}
            Batch::Trends(page) => {
                for trend in &page.trends {
                    match self.repo.upsert_trend(trend).await? {
                        UpsertOutcome::Inserted => inserted += 1,
                        UpsertOutcome::Updated => updated += 1,
                    }
                }
            }
        }

        Ok((inserted, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::models::Tweet;
    use crate::scrapers::scripted::ScriptedScraper;
    use crate::scrapers::{MockScraper, ScraperBackend};
    use crate::storage::MemoryRepository;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.jobs.max_retries = 2;
        config.jobs.initial_backoff_ms = 1;
        config.jobs.max_backoff_ms = 5;
        config.jobs.jitter = false;
        config.jobs.timeout_secs = 30;
        config
    }

    fn orchestrator_with(
        config: Config,
        backends: Vec<ScraperBackend>,
    ) -> (Orchestrator, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let retry = RetryPolicy {
            max_retries: config.backends.max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: false,
        };
        let chain = FallbackChain::new(backends, retry, Duration::from_secs(60));
        let orchestrator = Orchestrator::new(Arc::new(config), chain, repo.clone());
        (orchestrator, repo)
    }

    #[tokio::test]
    async fn auth_failure_falls_back_and_job_succeeds() {
        // Official API has no credentials; the open-source mirror serves 50.
        let official = ScriptedScraper::new(BackendKind::TwitterApi)
            .always(ScrapeError::AuthFailure("no credentials".into()));
        let mirror = ScriptedScraper::new(BackendKind::Nitter).tweets(50);
        let (orchestrator, repo) = orchestrator_with(
            test_config(),
            vec![
                ScraperBackend::Scripted(official),
                ScraperBackend::Scripted(mirror),
            ],
        );

        let result = orchestrator.run_scrape_tweets("rustlang", 50).await;
        assert_eq!(result.state, JobState::Succeeded);
        assert_eq!(result.backend, Some(BackendKind::Nitter));
        assert_eq!(result.items_normalized, 50);
        assert_eq!(result.inserted, 50);

        // Re-running the same query updates in place, never duplicates.
        let rerun = orchestrator.run_scrape_tweets("rustlang", 50).await;
        assert_eq!(rerun.state, JobState::Succeeded);
        assert_eq!(rerun.inserted, 0);
        assert_eq!(rerun.updated, 50);

        let (tweets, _, _) = repo.counts().await;
        assert_eq!(tweets, 50);
    }

    #[tokio::test]
    async fn retryable_exhaustion_terminates_in_failed() {
        let flaky = ScriptedScraper::new(BackendKind::Nitter)
            .always(ScrapeError::TransientNetwork("reset".into()));
        let calls = flaky.call_count();
        let config = test_config();
        let job_retries = config.jobs.max_retries;
        let backend_retries = config.backends.max_retries;
        let (orchestrator, _) =
            orchestrator_with(config, vec![ScraperBackend::Scripted(flaky)]);

        let result = orchestrator.run_scrape_tweets("rust", 10).await;
        assert_eq!(result.state, JobState::Failed);
        assert_eq!(result.error.as_deref(), Some("all_backends_exhausted"));
        assert_eq!(result.retries, job_retries);

        // Bounded effort: (1 + backend retries) per chain pass, one pass per
        // orchestrator attempt. No infinite loop.
        let expected = (1 + backend_retries as usize) * (1 + job_retries as usize);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), expected);
    }

    #[tokio::test]
    async fn auth_only_exhaustion_is_not_retried() {
        let dead = ScriptedScraper::new(BackendKind::TwitterApi)
            .always(ScrapeError::AuthFailure("revoked".into()));
        let (orchestrator, _) = orchestrator_with(test_config(), vec![ScraperBackend::Scripted(dead)]);

        let result = orchestrator.run_scrape_user("rustlang").await;
        assert_eq!(result.state, JobState::Failed);
        assert_eq!(result.retries, 0);
        assert_eq!(result.error.as_deref(), Some("all_backends_exhausted"));
    }

    #[tokio::test]
    async fn concurrent_duplicate_is_coalesced() {
        let slow = ScriptedScraper::new(BackendKind::Mock).with_delay(Duration::from_millis(100));
        let (orchestrator, _) = orchestrator_with(test_config(), vec![ScraperBackend::Scripted(slow)]);

        // Same logical account despite the case difference.
        let (a, b) = tokio::join!(
            orchestrator.run_scrape_user("rustlang"),
            orchestrator.run_scrape_user("@RustLang"),
        );

        let states = [a.state, b.state];
        assert!(states.contains(&JobState::Skipped), "one run must coalesce");
        assert!(states.contains(&JobState::Succeeded), "one run must execute");
    }

    #[tokio::test]
    async fn different_keys_run_in_parallel() {
        let (orchestrator, _) = orchestrator_with(
            test_config(),
            vec![ScraperBackend::Mock(MockScraper::new())],
        );

        let (a, b) = tokio::join!(
            orchestrator.run_scrape_user("rustlang"),
            orchestrator.run_scrape_user("ferris"),
        );
        assert_eq!(a.state, JobState::Succeeded);
        assert_eq!(b.state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn job_timeout_fails_and_cancels() {
        let stuck = ScriptedScraper::new(BackendKind::Nitter)
            .with_delay(Duration::from_secs(5))
            .tweets(1);
        let mut config = test_config();
        config.jobs.timeout_secs = 1;
        let (orchestrator, repo) = orchestrator_with(config, vec![ScraperBackend::Scripted(stuck)]);

        let started = Instant::now();
        let result = orchestrator.run_scrape_tweets("rust", 1).await;
        assert_eq!(result.state, JobState::Failed);
        assert_eq!(result.error.as_deref(), Some("job_timeout"));
        assert!(started.elapsed() < Duration::from_secs(3));

        // The cancelled fetch never reached the repository.
        let (tweets, _, _) = repo.counts().await;
        assert_eq!(tweets, 0);
    }

    #[tokio::test]
    async fn missing_user_is_an_empty_success() {
        let missing = ScriptedScraper::new(BackendKind::Nitter).always(ScrapeError::NotFound);
        let (orchestrator, _) =
            orchestrator_with(test_config(), vec![ScraperBackend::Scripted(missing)]);

        let result = orchestrator.run_scrape_user("ghost_account").await;
        assert_eq!(result.state, JobState::Succeeded);
        assert_eq!(result.items_fetched, 0);
        assert_eq!(result.inserted, 0);
    }

    #[tokio::test]
    async fn scheduled_scraping_covers_all_targets() {
        let mut config = test_config();
        config.schedule.queries = vec!["rust".into()];
        config.schedule.users = vec!["rustlang".into()];
        config.schedule.regions = vec!["worldwide".into()];
        config.schedule.tweet_limit = 10;
        let (orchestrator, repo) = orchestrator_with(
            config,
            vec![ScraperBackend::Mock(MockScraper::new())],
        );

        let result = orchestrator.run_scheduled_scraping().await;
        assert_eq!(result.state, JobState::Succeeded);
        assert!(result.error.is_none());

        let (tweets, users, trends) = repo.counts().await;
        assert_eq!(tweets, 10);
        assert_eq!(users, 1);
        assert!(trends > 0);

        // Second sweep dedups on identity: tweet count is unchanged.
        orchestrator.run_scheduled_scraping().await;
        let (tweets_again, users_again, _) = repo.counts().await;
        assert_eq!(tweets_again, 10);
        assert_eq!(users_again, 1);
    }

    #[tokio::test]
    async fn concurrent_scheduled_scraping_is_coalesced() {
        let mut config = test_config();
        config.schedule.queries = vec!["rust".into()];
        let slow = ScriptedScraper::new(BackendKind::Mock)
            .with_delay(Duration::from_millis(100))
            .tweets(1);
        let (orchestrator, _) = orchestrator_with(config, vec![ScraperBackend::Scripted(slow)]);

        let (a, b) = tokio::join!(
            orchestrator.run_scheduled_scraping(),
            orchestrator.run_scheduled_scraping(),
        );

        let states = [a.state, b.state];
        assert!(states.contains(&JobState::Skipped), "one sweep must coalesce");
        assert!(states.contains(&JobState::Succeeded), "one sweep must execute");
    }

    #[tokio::test]
    async fn cleanup_removes_only_records_past_the_window() {
        let (orchestrator, repo) = orchestrator_with(
            test_config(),
            vec![ScraperBackend::Mock(MockScraper::new())],
        );

        let now = Utc::now();
        let old = Tweet {
            id: "old".into(),
            author: "a".into(),
            text: "old".into(),
            created_at: now - chrono::Duration::days(31),
            likes: 0,
            reposts: 0,
            replies: 0,
            media: vec![],
        };
        let fresh = Tweet {
            id: "fresh".into(),
            created_at: now,
            ..old.clone()
        };
        repo.upsert_tweet(&old).await.unwrap();
        repo.upsert_tweet(&fresh).await.unwrap();

        let result = orchestrator.run_cleanup(Some(30)).await;
        assert_eq!(result.state, JobState::Succeeded);
        assert_eq!(result.deleted, 1);

        let (tweets, _, _) = repo.counts().await;
        assert_eq!(tweets, 1);
    }
}
