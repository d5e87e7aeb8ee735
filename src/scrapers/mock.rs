//! Deterministic mock backend.
//!
//! Generates synthetic records with zero external calls. Used for test
//! isolation and as the degraded-mode fallback when no real backend is
//! configured. Never fails with a network-class error.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::error::{ScrapeError, ScrapeResult};
use crate::models::{BackendKind, Trend, Tweet, User};
use crate::scrapers::{Scraper, TrendPage, TweetPage};
use crate::utils::{is_valid_username, normalize_username, stable_id};

const AUTHORS: [&str; 4] = ["synth_sarah", "synth_tom", "synth_ada", "synth_lin"];

const TOPICS: [&str; 5] = ["OpenSource", "Rust", "AI", "Privacy", "Infra"];

/// Synthetic data generator. Identities are derived from the request input,
/// so repeated calls yield the same ids and dedup naturally on upsert.
#[derive(Debug, Default)]
pub struct MockScraper;

impl MockScraper {
    pub fn new() -> Self {
        Self
    }

    /// Small deterministic number derived from the hex id.
    fn counter(id: &str, salt: u64) -> u64 {
        let byte = u64::from(id.as_bytes()[(salt as usize) % id.len()]);
        (byte * 37 + salt * 13) % 5_000
    }
}

#[async_trait]
impl Scraper for MockScraper {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn fetch_tweets(&self, query: &str, limit: usize) -> ScrapeResult<TweetPage> {
        let now = Utc::now();
        let tweets: Vec<Tweet> = (0..limit)
            .map(|i| {
                let id = format!("mock-{}", stable_id(&[query, &i.to_string()]));
                let likes = Self::counter(&id, 1);
                let reposts = Self::counter(&id, 2);
                let replies = Self::counter(&id, 3);
                Tweet {
                    author: AUTHORS[i % AUTHORS.len()].to_string(),
                    text: format!("Synthetic result {i} for \"{query}\""),
                    created_at: now - Duration::minutes(i as i64),
                    likes,
                    reposts,
                    replies,
                    media: Vec::new(),
                    id,
                }
            })
            .collect();

        Ok(TweetPage {
            fetched: tweets.len(),
            tweets,
        })
    }

    async fn fetch_user(&self, username: &str) -> ScrapeResult<User> {
        let username = normalize_username(username);
        if !is_valid_username(&username) {
            return Err(ScrapeError::NotFound);
        }

        let id = stable_id(&[&username]);
        Ok(User {
            display_name: {
                let mut chars = username.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => username.clone(),
                }
            },
            bio: format!("Synthetic profile for @{username}"),
            followers: Self::counter(&id, 4) * 100,
            following: Self::counter(&id, 5),
            verified: username.len() % 2 == 0,
            scraped_at: Utc::now(),
            username,
        })
    }

    async fn fetch_trends(&self, region: &str) -> ScrapeResult<TrendPage> {
        let now = Utc::now();
        let bucket = Trend::bucket_for(now);
        let trends: Vec<Trend> = TOPICS
            .iter()
            .enumerate()
            .map(|(i, topic)| {
                let id = stable_id(&[region, topic]);
                Trend {
                    topic: format!("#{topic}"),
                    bucket: bucket.clone(),
                    rank: i as u32 + 1,
                    volume: Self::counter(&id, 6) * 1_000,
                    region: region.to_string(),
                    observed_at: now,
                }
            })
            .collect();

        Ok(TrendPage {
            fetched: trends.len(),
            trends,
        })
    }
}
