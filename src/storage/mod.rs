//! Storage abstractions for record persistence.
//!
//! The sole persistence primitive is the upsert, keyed by each record's
//! identity. Upserts are atomic per record; callers never observe partial
//! writes. Reads exist for the HTTP surface.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Config, Trend, Tweet, User};

// Re-export for convenience
pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Whether an upsert created a new record or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persisted record families, for cleanup targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Tweets,
    Users,
    Trends,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Tweets, EntityKind::Users, EntityKind::Trends];
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Tweets => "tweets",
            EntityKind::Users => "users",
            EntityKind::Trends => "trends",
        };
        f.write_str(s)
    }
}

/// Trait for record persistence backends.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert or update a tweet by platform id. Engagement counts are
    /// refreshed; the record is never duplicated.
    async fn upsert_tweet(&self, tweet: &Tweet) -> Result<UpsertOutcome>;

    /// Insert or update a user by normalized username.
    async fn upsert_user(&self, user: &User) -> Result<UpsertOutcome>;

    /// Insert or update a trend by (topic, bucket). Closed buckets are
    /// never touched: upserts always target the current bucket's key.
    async fn upsert_trend(&self, trend: &Trend) -> Result<UpsertOutcome>;

    /// Delete records strictly older than `cutoff`. Returns the count.
    async fn delete_older_than(&self, kind: EntityKind, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Storage health probe.
    async fn ping(&self) -> Result<()>;

    /// Most recent tweets, optionally filtered by a substring of the text.
    async fn recent_tweets(&self, query: Option<&str>, limit: usize) -> Result<Vec<Tweet>>;

    /// Look up a user by (pre- or post-normalization) username.
    async fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// Most recent trends, optionally filtered by region.
    async fn latest_trends(&self, region: Option<&str>, limit: usize) -> Result<Vec<Trend>>;
}

/// Open the repository the configuration asks for: Postgres when a database
/// URL is set, the in-memory store otherwise.
pub async fn connect(config: &Config) -> Result<Arc<dyn Repository>> {
    match &config.storage.database_url {
        Some(url) => {
            log::info!("using postgres storage");
            let repo = PostgresRepository::connect(url, config.storage.max_connections).await?;
            Ok(Arc::new(repo))
        }
        None => {
            log::info!("no database configured; using in-memory storage");
            Ok(Arc::new(MemoryRepository::new()))
        }
    }
}
