//! In-memory repository.
//!
//! Default store when no database is configured, and the store the test
//! suite runs against. Maps are keyed by record identity, so the idempotent
//! upsert law holds by construction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{Trend, Tweet, User};
use crate::storage::{EntityKind, Repository, UpsertOutcome};
use crate::utils::normalize_username;

/// In-memory record store.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tweets: RwLock<HashMap<String, Tweet>>,
    users: RwLock<HashMap<String, User>>,
    trends: RwLock<HashMap<String, Trend>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record counts per family, for tests and diagnostics.
    pub async fn counts(&self) -> (usize, usize, usize) {
        (
            self.tweets.read().await.len(),
            self.users.read().await.len(),
            self.trends.read().await.len(),
        )
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn upsert_tweet(&self, tweet: &Tweet) -> Result<UpsertOutcome> {
        let mut tweets = self.tweets.write().await;
        match tweets.insert(tweet.id.clone(), tweet.clone()) {
            Some(_) => Ok(UpsertOutcome::Updated),
            None => Ok(UpsertOutcome::Inserted),
        }
    }

    async fn upsert_user(&self, user: &User) -> Result<UpsertOutcome> {
        let key = user.identity();
        let mut record = user.clone();
        record.username = key.clone();

        let mut users = self.users.write().await;
        match users.insert(key, record) {
            Some(_) => Ok(UpsertOutcome::Updated),
            None => Ok(UpsertOutcome::Inserted),
        }
    }

    async fn upsert_trend(&self, trend: &Trend) -> Result<UpsertOutcome> {
        let mut trends = self.trends.write().await;
        match trends.insert(trend.identity(), trend.clone()) {
            Some(_) => Ok(UpsertOutcome::Updated),
            None => Ok(UpsertOutcome::Inserted),
        }
    }

    async fn delete_older_than(&self, kind: EntityKind, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = match kind {
            EntityKind::Tweets => {
                let mut tweets = self.tweets.write().await;
                let before = tweets.len();
                tweets.retain(|_, t| t.created_at >= cutoff);
                before - tweets.len()
            }
            EntityKind::Users => {
                let mut users = self.users.write().await;
                let before = users.len();
                users.retain(|_, u| u.scraped_at >= cutoff);
                before - users.len()
            }
            EntityKind::Trends => {
                let mut trends = self.trends.write().await;
                let before = trends.len();
                trends.retain(|_, t| t.observed_at >= cutoff);
                before - trends.len()
            }
        };
        Ok(removed as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn recent_tweets(&self, query: Option<&str>, limit: usize) -> Result<Vec<Tweet>> {
        let tweets = self.tweets.read().await;
        let mut matched: Vec<Tweet> = tweets
            .values()
            .filter(|t| match query {
                Some(q) => t.text.to_lowercase().contains(&q.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&normalize_username(username)).cloned())
    }

    async fn latest_trends(&self, region: Option<&str>, limit: usize) -> Result<Vec<Trend>> {
        let trends = self.trends.read().await;
        let mut matched: Vec<Trend> = trends
            .values()
            .filter(|t| match region {
                Some(r) => t.region.eq_ignore_ascii_case(r),
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.observed_at.cmp(&a.observed_at).then(a.rank.cmp(&b.rank)));
        matched.truncate(limit);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tweet(id: &str, created_at: DateTime<Utc>) -> Tweet {
        Tweet {
            id: id.to_string(),
            author: "rustlang".to_string(),
            text: format!("tweet {id}"),
            created_at,
            likes: 0,
            reposts: 0,
            replies: 0,
            media: vec![],
        }
    }

    fn user(username: &str, followers: u64) -> User {
        User {
            username: username.to_string(),
            display_name: "Rust".to_string(),
            bio: String::new(),
            followers,
            following: 0,
            verified: false,
            scraped_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn repeated_upserts_never_duplicate() {
        let repo = MemoryRepository::new();
        let t = tweet("1111", Utc::now());

        assert_eq!(repo.upsert_tweet(&t).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(repo.upsert_tweet(&t).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(repo.upsert_tweet(&t).await.unwrap(), UpsertOutcome::Updated);

        let (tweets, _, _) = repo.counts().await;
        assert_eq!(tweets, 1);
    }

    #[tokio::test]
    async fn rescrape_updates_engagement_counts() {
        let repo = MemoryRepository::new();
        let mut t = tweet("1111", Utc::now());
        repo.upsert_tweet(&t).await.unwrap();

        t.likes = 99;
        repo.upsert_tweet(&t).await.unwrap();

        let stored = repo.recent_tweets(None, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].likes, 99);
    }

    #[tokio::test]
    async fn username_case_variants_hit_one_row() {
        let repo = MemoryRepository::new();
        repo.upsert_user(&user("RustLang", 100)).await.unwrap();
        let outcome = repo.upsert_user(&user(" @rustlang ", 200)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let stored = repo.get_user("RUSTLANG").await.unwrap().unwrap();
        assert_eq!(stored.username, "rustlang");
        assert_eq!(stored.followers, 200);
    }

    #[tokio::test]
    async fn trend_buckets_are_separate_records() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        let mut trend = Trend {
            topic: "#rust".to_string(),
            bucket: "2026-03-14T15".to_string(),
            rank: 1,
            volume: 100,
            region: "worldwide".to_string(),
            observed_at: now,
        };
        assert_eq!(
            repo.upsert_trend(&trend).await.unwrap(),
            UpsertOutcome::Inserted
        );

        // Same bucket: refresh in place.
        trend.volume = 150;
        assert_eq!(
            repo.upsert_trend(&trend).await.unwrap(),
            UpsertOutcome::Updated
        );

        // Next hour: a new record, history untouched.
        trend.bucket = "2026-03-14T16".to_string();
        assert_eq!(
            repo.upsert_trend(&trend).await.unwrap(),
            UpsertOutcome::Inserted
        );
        let (_, _, trends) = repo.counts().await;
        assert_eq!(trends, 2);
    }

    #[tokio::test]
    async fn cleanup_boundary_is_strict() {
        let repo = MemoryRepository::new();
        let cutoff = Utc::now();

        repo.upsert_tweet(&tweet("older", cutoff - Duration::seconds(1)))
            .await
            .unwrap();
        repo.upsert_tweet(&tweet("exact", cutoff)).await.unwrap();
        repo.upsert_tweet(&tweet("newer", cutoff + Duration::seconds(1)))
            .await
            .unwrap();

        let removed = repo
            .delete_older_than(EntityKind::Tweets, cutoff)
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = repo.recent_tweets(None, 10).await.unwrap();
        let ids: Vec<&str> = remaining.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&"exact"));
        assert!(ids.contains(&"newer"));
        assert!(!ids.contains(&"older"));
    }

    #[tokio::test]
    async fn recent_tweets_filters_and_orders() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        repo.upsert_tweet(&Tweet {
            text: "Rust release".to_string(),
            ..tweet("a", now - Duration::minutes(2))
        })
        .await
        .unwrap();
        repo.upsert_tweet(&Tweet {
            text: "unrelated".to_string(),
            ..tweet("b", now - Duration::minutes(1))
        })
        .await
        .unwrap();
        repo.upsert_tweet(&Tweet {
            text: "more rust news".to_string(),
            ..tweet("c", now)
        })
        .await
        .unwrap();

        let matched = repo.recent_tweets(Some("rust"), 10).await.unwrap();
        let ids: Vec<&str> = matched.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }
}
