//! Tweet data structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single tweet collected from a backend.
///
/// Identity is the platform tweet id. Engagement counts are mutable across
/// re-scrapes; everything else is fixed at publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tweet {
    /// Platform tweet id
    pub id: String,

    /// Author handle (without the leading `@`)
    pub author: String,

    /// Text body
    pub text: String,

    /// Publication timestamp
    pub created_at: DateTime<Utc>,

    /// Like count
    pub likes: u64,

    /// Repost/retweet count
    pub reposts: u64,

    /// Reply count
    pub replies: u64,

    /// Attached media URLs
    #[serde(default)]
    pub media: Vec<String>,
}

impl Tweet {
    /// Stable identity key used for deduplication.
    pub fn identity(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_platform_id() {
        let tweet = Tweet {
            id: "1234567890".to_string(),
            author: "rustlang".to_string(),
            text: "hello".to_string(),
            created_at: Utc::now(),
            likes: 1,
            reposts: 2,
            replies: 3,
            media: vec![],
        };
        assert_eq!(tweet.identity(), "1234567890");
    }
}
