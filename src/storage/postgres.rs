//! Postgres repository.
//!
//! Upserts are `INSERT ... ON CONFLICT` statements keyed by record identity,
//! so each write is atomic per record and safe against concurrent ingestion
//! and cleanup. The pool is shared across workers; no connection is held
//! beyond a single statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::Result;
use crate::models::{Trend, Tweet, User};
use crate::storage::{EntityKind, Repository, UpsertOutcome};
use crate::utils::normalize_username;

/// Postgres-backed record store.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Connect and make sure the tables exist.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tweets (
                id          TEXT PRIMARY KEY,
                author      TEXT NOT NULL,
                text        TEXT NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL,
                likes       BIGINT NOT NULL DEFAULT 0,
                reposts     BIGINT NOT NULL DEFAULT 0,
                replies     BIGINT NOT NULL DEFAULT 0,
                media       TEXT[] NOT NULL DEFAULT '{}'
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                username     TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                bio          TEXT NOT NULL DEFAULT '',
                followers    BIGINT NOT NULL DEFAULT 0,
                following    BIGINT NOT NULL DEFAULT 0,
                verified     BOOLEAN NOT NULL DEFAULT FALSE,
                scraped_at   TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trends (
                topic       TEXT NOT NULL,
                bucket      TEXT NOT NULL,
                rank        INT NOT NULL,
                volume      BIGINT NOT NULL DEFAULT 0,
                region      TEXT NOT NULL,
                observed_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (topic, bucket)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_tweet(row: &sqlx::postgres::PgRow) -> std::result::Result<Tweet, sqlx::Error> {
    Ok(Tweet {
        id: row.try_get("id")?,
        author: row.try_get("author")?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
        likes: row.try_get::<i64, _>("likes")? as u64,
        reposts: row.try_get::<i64, _>("reposts")? as u64,
        replies: row.try_get::<i64, _>("replies")? as u64,
        media: row.try_get("media")?,
    })
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> std::result::Result<User, sqlx::Error> {
    Ok(User {
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        bio: row.try_get("bio")?,
        followers: row.try_get::<i64, _>("followers")? as u64,
        following: row.try_get::<i64, _>("following")? as u64,
        verified: row.try_get("verified")?,
        scraped_at: row.try_get("scraped_at")?,
    })
}

fn row_to_trend(row: &sqlx::postgres::PgRow) -> std::result::Result<Trend, sqlx::Error> {
    Ok(Trend {
        topic: row.try_get("topic")?,
        bucket: row.try_get("bucket")?,
        rank: row.try_get::<i32, _>("rank")? as u32,
        volume: row.try_get::<i64, _>("volume")? as u64,
        region: row.try_get("region")?,
        observed_at: row.try_get("observed_at")?,
    })
}

fn outcome(inserted: bool) -> UpsertOutcome {
    if inserted {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::Updated
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn upsert_tweet(&self, tweet: &Tweet) -> Result<UpsertOutcome> {
        // xmax = 0 distinguishes a fresh insert from a conflict update.
        let inserted = sqlx::query_scalar::<_, bool>(
            "INSERT INTO tweets (id, author, text, created_at, likes, reposts, replies, media)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                text = EXCLUDED.text,
                likes = EXCLUDED.likes,
                reposts = EXCLUDED.reposts,
                replies = EXCLUDED.replies,
                media = EXCLUDED.media
             RETURNING (xmax = 0)",
        )
        .bind(&tweet.id)
        .bind(&tweet.author)
        .bind(&tweet.text)
        .bind(tweet.created_at)
        .bind(tweet.likes as i64)
        .bind(tweet.reposts as i64)
        .bind(tweet.replies as i64)
        .bind(&tweet.media)
        .fetch_one(&self.pool)
        .await?;

        Ok(outcome(inserted))
    }

    async fn upsert_user(&self, user: &User) -> Result<UpsertOutcome> {
        let inserted = sqlx::query_scalar::<_, bool>(
            "INSERT INTO users (username, display_name, bio, followers, following, verified, scraped_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (username) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                bio = EXCLUDED.bio,
                followers = EXCLUDED.followers,
                following = EXCLUDED.following,
                verified = EXCLUDED.verified,
                scraped_at = EXCLUDED.scraped_at
             RETURNING (xmax = 0)",
        )
        .bind(user.identity())
        .bind(&user.display_name)
        .bind(&user.bio)
        .bind(user.followers as i64)
        .bind(user.following as i64)
        .bind(user.verified)
        .bind(user.scraped_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(outcome(inserted))
    }

    async fn upsert_trend(&self, trend: &Trend) -> Result<UpsertOutcome> {
        // Upserts only ever target the current bucket, so closed buckets
        // stay immutable: a later hour conflicts on a different key.
        let inserted = sqlx::query_scalar::<_, bool>(
            "INSERT INTO trends (topic, bucket, rank, volume, region, observed_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (topic, bucket) DO UPDATE SET
                rank = EXCLUDED.rank,
                volume = EXCLUDED.volume,
                observed_at = EXCLUDED.observed_at
             RETURNING (xmax = 0)",
        )
        .bind(trend.topic.to_lowercase())
        .bind(&trend.bucket)
        .bind(trend.rank as i32)
        .bind(trend.volume as i64)
        .bind(&trend.region)
        .bind(trend.observed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(outcome(inserted))
    }

    async fn delete_older_than(&self, kind: EntityKind, cutoff: DateTime<Utc>) -> Result<u64> {
        let statement = match kind {
            EntityKind::Tweets => "DELETE FROM tweets WHERE created_at < $1",
            EntityKind::Users => "DELETE FROM users WHERE scraped_at < $1",
            EntityKind::Trends => "DELETE FROM trends WHERE observed_at < $1",
        };
        let result = sqlx::query(statement).bind(cutoff).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn recent_tweets(&self, query: Option<&str>, limit: usize) -> Result<Vec<Tweet>> {
        let rows = match query {
            Some(q) => {
                sqlx::query(
                    "SELECT id, author, text, created_at, likes, reposts, replies, media
                     FROM tweets WHERE text ILIKE '%' || $1 || '%'
                     ORDER BY created_at DESC LIMIT $2",
                )
                .bind(q)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, author, text, created_at, likes, reposts, replies, media
                     FROM tweets ORDER BY created_at DESC LIMIT $1",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut tweets = Vec::with_capacity(rows.len());
        for row in &rows {
            tweets.push(row_to_tweet(row)?);
        }
        Ok(tweets)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT username, display_name, bio, followers, following, verified, scraped_at
             FROM users WHERE username = $1",
        )
        .bind(normalize_username(username))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn latest_trends(&self, region: Option<&str>, limit: usize) -> Result<Vec<Trend>> {
        let rows = match region {
            Some(r) => {
                sqlx::query(
                    "SELECT topic, bucket, rank, volume, region, observed_at
                     FROM trends WHERE LOWER(region) = LOWER($1)
                     ORDER BY observed_at DESC, rank ASC LIMIT $2",
                )
                .bind(r)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT topic, bucket, rank, volume, region, observed_at
                     FROM trends ORDER BY observed_at DESC, rank ASC LIMIT $1",
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut trends = Vec::with_capacity(rows.len());
        for row in &rows {
            trends.push(row_to_trend(row)?);
        }
        Ok(trends)
    }
}
