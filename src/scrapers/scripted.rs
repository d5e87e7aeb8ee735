//! Test-only backend with scripted outcomes.
//!
//! Lets chain and orchestrator tests pin down fallback ordering, retry
//! budgets, and coalescing without any network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{BackendKind, Trend, Tweet, User};
use crate::scrapers::{Scraper, TrendPage, TweetPage};
use crate::utils::normalize_username;

#[derive(Debug)]
pub struct ScriptedScraper {
    kind: BackendKind,
    serve_count: usize,
    error: Option<ScrapeError>,
    always_fail: bool,
    fail_first: Mutex<u32>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedScraper {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            serve_count: 0,
            error: None,
            always_fail: false,
            fail_first: Mutex::new(0),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `count` synthetic tweets (or trends) per successful call.
    pub fn tweets(mut self, count: usize) -> Self {
        self.serve_count = count;
        self
    }

    /// Fail every call with the given error.
    pub fn always(mut self, error: ScrapeError) -> Self {
        self.error = Some(error);
        self.always_fail = true;
        self
    }

    /// Fail the first call with the given error, then serve `count` items.
    pub fn fail_then_serve(mut self, error: ScrapeError, count: usize) -> Self {
        self.error = Some(error);
        self.fail_first = Mutex::new(1);
        self.serve_count = count;
        self
    }

    /// Sleep this long before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared call counter.
    pub fn call_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    async fn respond(&self) -> ScrapeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.always_fail {
            if let Some(error) = &self.error {
                return Err(error.clone());
            }
        }

        let mut remaining = self.fail_first.lock().expect("script lock poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            if let Some(error) = &self.error {
                return Err(error.clone());
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Scraper for ScriptedScraper {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn fetch_tweets(&self, query: &str, _limit: usize) -> ScrapeResult<TweetPage> {
        self.respond().await?;
        let now = Utc::now();
        let tweets: Vec<Tweet> = (0..self.serve_count)
            .map(|i| Tweet {
                id: format!("scripted-{query}-{i}"),
                author: "scripted".to_string(),
                text: format!("scripted tweet {i}"),
                created_at: now,
                likes: i as u64,
                reposts: 0,
                replies: 0,
                media: Vec::new(),
            })
            .collect();
        Ok(TweetPage {
            fetched: tweets.len(),
            tweets,
        })
    }

    async fn fetch_user(&self, username: &str) -> ScrapeResult<User> {
        self.respond().await?;
        Ok(User {
            username: normalize_username(username),
            display_name: format!("Scripted {username}"),
            bio: String::new(),
            followers: 100,
            following: 10,
            verified: false,
            scraped_at: Utc::now(),
        })
    }

    async fn fetch_trends(&self, region: &str) -> ScrapeResult<TrendPage> {
        self.respond().await?;
        let now = Utc::now();
        let bucket = Trend::bucket_for(now);
        let trends: Vec<Trend> = (0..self.serve_count)
            .map(|i| Trend {
                topic: format!("#scripted{i}"),
                bucket: bucket.clone(),
                rank: i as u32 + 1,
                volume: 0,
                region: region.to_string(),
                observed_at: now,
            })
            .collect();
        Ok(TrendPage {
            fetched: trends.len(),
            trends,
        })
    }
}
