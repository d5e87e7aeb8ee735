//! User profile data structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::normalize_username;

/// A user profile collected from a backend.
///
/// Identity is the case-normalized username; construction sites must pass
/// the handle through [`normalize_username`] so the same logical account
/// never produces two rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Normalized username (lowercased, trimmed, no leading `@`)
    pub username: String,

    /// Display name as shown on the profile
    pub display_name: String,

    /// Profile bio
    pub bio: String,

    /// Follower count
    pub followers: u64,

    /// Following count
    pub following: u64,

    /// Verified flag
    pub verified: bool,

    /// When this profile was last scraped
    pub scraped_at: DateTime<Utc>,
}

impl User {
    /// Stable identity key used for deduplication.
    pub fn identity(&self) -> String {
        normalize_username(&self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_normalizes_case() {
        let user = User {
            username: " @RustLang ".to_string(),
            display_name: "Rust".to_string(),
            bio: String::new(),
            followers: 0,
            following: 0,
            verified: true,
            scraped_at: Utc::now(),
        };
        assert_eq!(user.identity(), "rustlang");
    }
}
