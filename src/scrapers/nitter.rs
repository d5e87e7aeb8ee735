// src/scrapers/nitter.rs

//! Open-source backend: scrapes a Nitter-style HTML mirror.
//!
//! No platform credentials required. Higher latency than the official API
//! and subject to anti-scraping rate limits, which surface as `RateLimited`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result, ScrapeError, ScrapeResult};
use crate::models::{BackendKind, Config, Trend, Tweet, User};
use crate::scrapers::{Scraper, TrendPage, TweetPage};
use crate::utils::{clean_text, normalize_username, parse_count, parse_date};

/// HTML mirror scraper.
pub struct NitterScraper {
    client: Client,
    base: Url,
}

impl std::fmt::Debug for NitterScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NitterScraper")
            .field("base", &self.base.as_str())
            .finish()
    }
}

impl NitterScraper {
    /// Create a mirror scraper from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let base = Url::parse(&config.backends.nitter_base_url)
            .map_err(|e| AppError::config(format!("backends.nitter_base_url: {e}")))?;
        let client = Client::builder()
            .user_agent(&config.scraper.user_agent)
            .timeout(Duration::from_secs(config.scraper.timeout_secs))
            .build()?;
        Ok(Self { client, base })
    }

    /// Fetch a page, mapping transport failures and HTTP statuses onto the
    /// scrape-error taxonomy.
    async fn get(&self, url: Url) -> ScrapeResult<String> {
        let response = self
            .client
            .get(url)
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
        url.set_path(path);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }
}

/// Map an HTTP status onto the scrape taxonomy. `None` means success.
///
/// Mirrors block scrapers with 429 and occasionally 403; both mean "back
/// off", not "bad credentials", since no credentials are involved here.
fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Option<ScrapeError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN => {
            ScrapeError::RateLimited { retry_after }
        }
        StatusCode::NOT_FOUND => ScrapeError::NotFound,
        s if s.is_server_error() => ScrapeError::TransientNetwork(format!("mirror returned {s}")),
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

fn sel(s: &str) -> ScrapeResult<Selector> {
    Selector::parse(s).map_err(|e| ScrapeError::BackendContract(format!("selector '{s}': {e:?}")))
}

/// Parse one timeline item. `None` drops the item (caller logs and counts).
fn parse_tweet_item(item: &ElementRef<'_>, base: &Url) -> Option<Tweet> {
    let link_sel = sel("a.tweet-link").ok()?;
    let author_sel = sel("a.username").ok()?;
    let content_sel = sel(".tweet-content").ok()?;
    let date_sel = sel(".tweet-date a").ok()?;
    let stat_sel = sel(".tweet-stats .tweet-stat").ok()?;
    let media_sel = sel(".attachments img").ok()?;

    let permalink = item.select(&link_sel).next()?.value().attr("href")?;
    let id = extract_status_id(permalink)?;

    let author_raw: String = item.select(&author_sel).next()?.text().collect();
    let author = normalize_username(&author_raw);
    if author.is_empty() {
        return None;
    }

    let text: String = item.select(&content_sel).next()?.text().collect();

    let date_raw = item.select(&date_sel).next()?.value().attr("title")?;
    let created_at = parse_date(date_raw)?;

    // Stat order on the mirror: replies, reposts, quotes, likes.
    let stats: Vec<u64> = item
        .select(&stat_sel)
        .map(|el| parse_count(&el.text().collect::<String>()))
        .collect();

    let media = item
        .select(&media_sel)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| base.join(src).ok())
        .map(|u| u.to_string())
        .collect();

    Some(Tweet {
        id,
        author,
        text: clean_text(&text),
        created_at,
        replies: stats.first().copied().unwrap_or(0),
        reposts: stats.get(1).copied().unwrap_or(0),
        likes: stats.get(3).copied().unwrap_or(0),
        media,
    })
}

/// Pull the numeric status id out of a permalink like
/// `/rustlang/status/1234567890#m`.
fn extract_status_id(href: &str) -> Option<String> {
    let re = regex::Regex::new(r"/status/(\d+)").ok()?;
    re.captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_search_page(html: &str, limit: usize, base: &Url) -> ScrapeResult<TweetPage> {
    let document = Html::parse_document(html);

    let timeline_sel = sel(".timeline")?;
    if document.select(&timeline_sel).next().is_none() {
        return Err(ScrapeError::BackendContract(
            "search response has no timeline container".into(),
        ));
    }

    let item_sel = sel(".timeline .timeline-item")?;
    let mut tweets = Vec::new();
    let mut fetched = 0usize;

    for item in document.select(&item_sel).take(limit) {
        fetched += 1;
        match parse_tweet_item(&item, base) {
            Some(tweet) => tweets.push(tweet),
            None => log::warn!("dropping malformed timeline item {fetched}"),
        }
    }

    if fetched > 0 && tweets.is_empty() {
        return Err(ScrapeError::BackendContract(format!(
            "all {fetched} timeline items failed normalization"
        )));
    }

    Ok(TweetPage { tweets, fetched })
}

fn parse_profile_page(html: &str, username: &str) -> ScrapeResult<User> {
    let document = Html::parse_document(html);

    let name_sel = sel(".profile-card-fullname")?;
    let bio_sel = sel(".profile-bio")?;
    let stat_sel = sel(".profile-statlist .profile-stat-num")?;
    let verified_sel = sel(".profile-card .verified-icon")?;

    let display_name = document
        .select(&name_sel)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .ok_or_else(|| ScrapeError::BackendContract("profile page has no name card".into()))?;

    let bio = document
        .select(&bio_sel)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .unwrap_or_default();

    // Stat order on the mirror: tweets, following, followers, likes.
    let stats: Vec<u64> = document
        .select(&stat_sel)
        .map(|el| parse_count(&el.text().collect::<String>()))
        .collect();

    Ok(User {
        username: normalize_username(username),
        display_name,
        bio,
        following: stats.get(1).copied().unwrap_or(0),
        followers: stats.get(2).copied().unwrap_or(0),
        verified: document.select(&verified_sel).next().is_some(),
        scraped_at: Utc::now(),
    })
}

fn parse_trends_page(html: &str, region: &str) -> ScrapeResult<TrendPage> {
    let document = Html::parse_document(html);
    let item_sel = sel(".trend-item a")?;

    let now = Utc::now();
    let bucket = Trend::bucket_for(now);
    let mut trends = Vec::new();
    let mut fetched = 0usize;

    for (i, el) in document.select(&item_sel).enumerate() {
        fetched += 1;
        let topic = clean_text(&el.text().collect::<String>());
        if topic.is_empty() {
            log::warn!("dropping empty trend entry {fetched}");
            continue;
        }
        trends.push(Trend {
            topic,
            bucket: bucket.clone(),
            rank: i as u32 + 1,
            volume: 0, // the mirror does not report volumes
            region: region.to_string(),
            observed_at: now,
        });
    }

    if fetched > 0 && trends.is_empty() {
        return Err(ScrapeError::BackendContract(format!(
            "all {fetched} trend entries failed normalization"
        )));
    }

    Ok(TrendPage { trends, fetched })
}

#[async_trait]
impl Scraper for NitterScraper {
    fn kind(&self) -> BackendKind {
        BackendKind::Nitter
    }

    async fn fetch_tweets(&self, query: &str, limit: usize) -> ScrapeResult<TweetPage> {
        let url = self.url_for("/search", &[("f", "tweets"), ("q", query)]);
        let html = self.get(url).await?;
        parse_search_page(&html, limit, &self.base)
    }

    async fn fetch_user(&self, username: &str) -> ScrapeResult<User> {
        let username = normalize_username(username);
        let url = self.url_for(&format!("/{username}"), &[]);
        let html = self.get(url).await?;
        parse_profile_page(&html, &username)
    }

    async fn fetch_trends(&self, region: &str) -> ScrapeResult<TrendPage> {
        let url = self.url_for("/trends", &[("r", region)]);
        let html = self.get(url).await?;
        parse_trends_page(&html, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://nitter.example").unwrap()
    }

    const SEARCH_HTML: &str = r#"
        <div class="timeline">
          <div class="timeline-item">
            <a class="tweet-link" href="/rustlang/status/1111#m"></a>
            <a class="username">@rustlang</a>
            <div class="tweet-content">Rust 1.99 is out</div>
            <span class="tweet-date"><a title="Mar 14, 2026 · 3:09 PM UTC">Mar 14</a></span>
            <div class="tweet-stats">
              <span class="tweet-stat">12</span>
              <span class="tweet-stat">34</span>
              <span class="tweet-stat">5</span>
              <span class="tweet-stat">1.2K</span>
            </div>
          </div>
          <div class="timeline-item">
            <a class="tweet-link" href="/ferris/status/2222#m"></a>
            <a class="username">@ferris</a>
            <div class="tweet-content">claws</div>
            <span class="tweet-date"><a title="Mar 14, 2026 · 4:00 PM UTC">Mar 14</a></span>
          </div>
          <div class="timeline-item">
            <div class="tweet-content">orphan row with no permalink</div>
          </div>
        </div>
    "#;

    #[test]
    fn parses_timeline_items_and_drops_malformed() {
        let page = parse_search_page(SEARCH_HTML, 50, &base()).unwrap();
        assert_eq!(page.fetched, 3);
        assert_eq!(page.tweets.len(), 2);

        let first = &page.tweets[0];
        assert_eq!(first.id, "1111");
        assert_eq!(first.author, "rustlang");
        assert_eq!(first.text, "Rust 1.99 is out");
        assert_eq!(first.replies, 12);
        assert_eq!(first.reposts, 34);
        assert_eq!(first.likes, 1_200);
    }

    #[test]
    fn limit_truncates_the_page() {
        let page = parse_search_page(SEARCH_HTML, 1, &base()).unwrap();
        assert_eq!(page.fetched, 1);
        assert_eq!(page.tweets.len(), 1);
    }

    #[test]
    fn missing_timeline_is_a_contract_error() {
        let err = parse_search_page("<html><body>blocked</body></html>", 10, &base()).unwrap_err();
        assert!(matches!(err, ScrapeError::BackendContract(_)));
    }

    #[test]
    fn all_items_failing_is_a_contract_error() {
        let html = r#"<div class="timeline">
            <div class="timeline-item"><div class="tweet-content">no link</div></div>
        </div>"#;
        let err = parse_search_page(html, 10, &base()).unwrap_err();
        assert!(matches!(err, ScrapeError::BackendContract(_)));
    }

    #[test]
    fn parses_profile_page() {
        let html = r#"
            <div class="profile-card">
              <div class="profile-card-fullname">Rust Language <span class="verified-icon"></span></div>
              <div class="profile-bio">A systems programming language.</div>
              <ul class="profile-statlist">
                <li><span class="profile-stat-num">5,000</span></li>
                <li><span class="profile-stat-num">12</span></li>
                <li><span class="profile-stat-num">900.1K</span></li>
                <li><span class="profile-stat-num">3</span></li>
              </ul>
            </div>
        "#;
        let user = parse_profile_page(html, "@RustLang").unwrap();
        assert_eq!(user.username, "rustlang");
        assert_eq!(user.display_name, "Rust Language");
        assert_eq!(user.following, 12);
        assert_eq!(user.followers, 900_100);
        assert!(user.verified);
    }

    #[test]
    fn profile_without_name_card_is_a_contract_error() {
        let err = parse_profile_page("<html></html>", "rustlang").unwrap_err();
        assert!(matches!(err, ScrapeError::BackendContract(_)));
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::OK, None).is_none());
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None),
            Some(ScrapeError::RateLimited { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, None),
            Some(ScrapeError::RateLimited { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None),
            Some(ScrapeError::NotFound)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None),
            Some(ScrapeError::TransientNetwork(_))
        ));
    }

    #[test]
    fn extracts_status_ids() {
        assert_eq!(
            extract_status_id("/rustlang/status/1234567890#m"),
            Some("1234567890".to_string())
        );
        assert_eq!(extract_status_id("/about"), None);
    }
}
