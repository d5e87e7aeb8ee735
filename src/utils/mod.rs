//! Utility functions and helpers.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Collapse whitespace runs and trim the ends.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a username for identity comparison: trim, strip a leading `@`,
/// lowercase. Must be applied before every lookup or upsert.
pub fn normalize_username(s: &str) -> String {
    s.trim().trim_start_matches('@').to_lowercase()
}

/// Whether a normalized username is plausible for the platform
/// (1-15 characters, alphanumeric and underscore).
pub fn is_valid_username(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[a-z0-9_]{1,15}$").unwrap());
    re.is_match(s)
}

/// Parse a provider timestamp, tolerating the handful of formats the
/// backends emit. Returns `None` for anything unrecognized.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = clean_text(s);

    // RFC 3339 (official API)
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Legacy API format: "Wed Mar 14 15:09:26 +0000 2026"
    if let Ok(dt) = DateTime::parse_from_str(&s, "%a %b %d %H:%M:%S %z %Y") {
        return Some(dt.with_timezone(&Utc));
    }

    // Mirror format: "Mar 14, 2026 · 3:09 PM UTC"
    let stripped = s.replace('·', " ");
    let stripped = clean_text(&stripped);
    let stripped = stripped.trim_end_matches(" UTC").to_string();
    if let Ok(dt) = NaiveDateTime::parse_from_str(&stripped, "%b %d, %Y %I:%M %p") {
        return Some(dt.and_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }

    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}

/// Parse an engagement count, tolerating thousands separators and the
/// abbreviated forms mirrors render ("1,234", "12.5K", "3M").
pub fn parse_count(s: &str) -> u64 {
    let s = clean_text(s).replace(',', "");
    if s.is_empty() {
        return 0;
    }

    let (number, multiplier) = match s.chars().last() {
        Some('K') | Some('k') => (&s[..s.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&s[..s.len() - 1], 1_000_000.0),
        Some('B') | Some('b') => (&s[..s.len() - 1], 1_000_000_000.0),
        _ => (s.as_str(), 1.0),
    };

    number
        .parse::<f64>()
        .map(|n| (n * multiplier) as u64)
        .unwrap_or(0)
}

/// Stable hex identifier derived from the given parts.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0]);
    }
    hex::encode(&hasher.finalize()[..8])
}
