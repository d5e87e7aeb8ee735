//! Trend data structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trending topic observation.
///
/// Identity is the (topic, time bucket) composite. A record is immutable once
/// its bucket closes; observations in a later hour open a new bucket instead
/// of mutating history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trend {
    /// Topic label (hashtag or phrase)
    pub topic: String,

    /// UTC hour bucket, formatted `YYYY-MM-DDTHH`
    pub bucket: String,

    /// Rank within the region at observation time (1 = top)
    pub rank: u32,

    /// Tweet volume, when the provider reports one
    pub volume: u64,

    /// Region the trend was observed in
    pub region: String,

    /// Observation timestamp
    pub observed_at: DateTime<Utc>,
}

impl Trend {
    /// The bucket label for a given instant.
    pub fn bucket_for(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m-%dT%H").to_string()
    }

    /// Stable identity key used for deduplication.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.topic.to_lowercase(), self.bucket)
    }
}
