// src/scrapers/twitter_api.rs

//! Official API backend.
//!
//! Authenticated JSON client with higher rate limits and stricter quotas.
//! Requires a bearer token at construction and fails fast with
//! `AuthFailure` when none is configured.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result, ScrapeError, ScrapeResult};
use crate::models::{BackendKind, Config, Trend, Tweet, User};
use crate::scrapers::{Scraper, TrendPage, TweetPage};
use crate::utils::{normalize_username, parse_date};

/// Authenticated API client.
pub struct TwitterApiScraper {
    client: Client,
    base: Url,
    token: String,
}

impl std::fmt::Debug for TwitterApiScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterApiScraper")
            .field("base", &self.base.as_str())
            .finish()
    }
}

impl TwitterApiScraper {
    /// Create an API client from configuration.
    ///
    /// Returns `AuthFailure` when no bearer token is configured, so the
    /// capability check can drop this variant from the chain.
    pub fn new(config: &Config) -> Result<Self> {
        let token = config
            .backends
            .bearer_token()
            .ok_or_else(|| ScrapeError::AuthFailure("no bearer token configured".into()))?;
        let base = Url::parse(&config.backends.api_base_url)
            .map_err(|e| AppError::config(format!("backends.api_base_url: {e}")))?;
        let client = Client::builder()
            .user_agent(&config.scraper.user_agent)
            .timeout(Duration::from_secs(config.scraper.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    async fn get_json(&self, url: Url) -> ScrapeResult<String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(ScrapeError::from_transport)?;

        let retry_after = retry_after_header(&response);
        if let Some(err) = classify_status(response.status(), retry_after) {
            return Err(err);
        }

        response.text().await.map_err(ScrapeError::from_transport)
    }

    fn url_for(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.base.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }
}

/// Map an API status onto the scrape taxonomy. `None` means success.
fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Option<ScrapeError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ScrapeError::AuthFailure(format!("API returned {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => ScrapeError::RateLimited { retry_after },
        StatusCode::NOT_FOUND => ScrapeError::NotFound,
        s if s.is_server_error() => ScrapeError::TransientNetwork(format!("API returned {s}")),
        s => ScrapeError::BackendContract(format!("unexpected status {s}")),
    })
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn decode<T: for<'de> Deserialize<'de>>(body: &str) -> ScrapeResult<T> {
    serde_json::from_str(body)
        .map_err(|e| ScrapeError::BackendContract(format!("malformed API response: {e}")))
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<String>,
    public_metrics: Option<TweetMetrics>,
}

#[derive(Debug, Deserialize, Default)]
struct TweetMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
}

#[derive(Debug, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(default)]
    id: String,
    username: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    verified: bool,
    public_metrics: Option<UserMetrics>,
}

#[derive(Debug, Deserialize, Default)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    following_count: u64,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct TrendsResponse {
    #[serde(default)]
    data: Vec<ApiTrend>,
}

#[derive(Debug, Deserialize)]
struct ApiTrend {
    trend_name: String,
    tweet_count: Option<u64>,
}

// --- Normalization ---

fn normalize_tweet(raw: ApiTweet, users: &HashMap<String, String>) -> Option<Tweet> {
    let author = raw
        .author_id
        .as_deref()
        .and_then(|id| users.get(id))
        .map(|handle| normalize_username(handle))?;
    let created_at = raw.created_at.as_deref().and_then(parse_date)?;
    let metrics = raw.public_metrics.unwrap_or_default();

    Some(Tweet {
        id: raw.id,
        author,
        text: raw.text,
        created_at,
        likes: metrics.like_count,
        reposts: metrics.retweet_count,
        replies: metrics.reply_count,
        media: Vec::new(),
    })
}

fn normalize_search(response: SearchResponse, limit: usize) -> ScrapeResult<TweetPage> {
    let users: HashMap<String, String> = response
        .includes
        .map(|inc| {
            inc.users
                .into_iter()
                .map(|u| (u.id, u.username))
                .collect()
        })
        .unwrap_or_default();

    let mut tweets = Vec::new();
    let mut fetched = 0usize;

    for raw in response.data.into_iter().take(limit) {
        fetched += 1;
        let id = raw.id.clone();
        match normalize_tweet(raw, &users) {
            Some(tweet) => tweets.push(tweet),
            None => log::warn!("dropping API tweet {id}: missing author or timestamp"),
        }
    }

    if fetched > 0 && tweets.is_empty() {
        return Err(ScrapeError::BackendContract(format!(
            "all {fetched} API tweets failed normalization"
        )));
    }

    Ok(TweetPage { tweets, fetched })
}

fn normalize_user(raw: ApiUser) -> User {
    let metrics = raw.public_metrics.unwrap_or_default();
    User {
        username: normalize_username(&raw.username),
        display_name: raw.name,
        bio: raw.description,
        followers: metrics.followers_count,
        following: metrics.following_count,
        verified: raw.verified,
        scraped_at: Utc::now(),
    }
}

fn normalize_trends(response: TrendsResponse, region: &str) -> TrendPage {
    let now = Utc::now();
    let bucket = Trend::bucket_for(now);
    let fetched = response.data.len();
    let trends = response
        .data
        .into_iter()
        .enumerate()
        .map(|(i, raw)| Trend {
            topic: raw.trend_name,
            bucket: bucket.clone(),
            rank: i as u32 + 1,
            volume: raw.tweet_count.unwrap_or(0),
            region: region.to_string(),
            observed_at: now,
        })
        .collect();
    TrendPage { trends, fetched }
}

/// Map a configured region name to the provider's location id.
/// Unknown regions fall back to worldwide.
fn woeid_for(region: &str) -> u64 {
    match region.trim().to_lowercase().as_str() {
        "worldwide" | "" => 1,
        "us" | "united states" => 23_424_977,
        "uk" | "united kingdom" => 23_424_975,
        "japan" => 23_424_856,
        "germany" => 23_424_829,
        "brazil" => 23_424_768,
        other => {
            log::warn!("unknown trend region '{other}', using worldwide");
            1
        }
    }
}

#[async_trait]
impl Scraper for TwitterApiScraper {
    fn kind(&self) -> BackendKind {
        BackendKind::TwitterApi
    }

    async fn fetch_tweets(&self, query: &str, limit: usize) -> ScrapeResult<TweetPage> {
        // The endpoint accepts 10..=100 results per page.
        let max_results = limit.clamp(10, 100).to_string();
        let url = self.url_for(
            "tweets/search/recent",
            &[
                ("query", query),
                ("max_results", max_results.as_str()),
                ("expansions", "author_id"),
                ("tweet.fields", "created_at,public_metrics"),
                ("user.fields", "username"),
            ],
        );
        let body = self.get_json(url).await?;
        normalize_search(decode(&body)?, limit)
    }

    async fn fetch_user(&self, username: &str) -> ScrapeResult<User> {
        let username = normalize_username(username);
        let url = self.url_for(
            &format!("users/by/username/{username}"),
            &[("user.fields", "description,public_metrics,verified")],
        );
        let body = self.get_json(url).await?;
        let response: UserResponse = decode(&body)?;
        match response.data {
            Some(raw) => Ok(normalize_user(raw)),
            None => Err(ScrapeError::NotFound),
        }
    }

    async fn fetch_trends(&self, region: &str) -> ScrapeResult<TrendPage> {
        let woeid = woeid_for(region).to_string();
        let url = self.url_for(&format!("trends/by/woeid/{woeid}"), &[]);
        let body = self.get_json(url).await?;
        Ok(normalize_trends(decode(&body)?, region))
    }
}
