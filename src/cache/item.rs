//! Cached producer results

use crate::error::{ClientError, ClientResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Buckets by query id, each holding the items for distinct args
pub type Store = BTreeMap<String, Vec<CacheItem>>;

/// One serialized producer result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    /// Args signature, unique within a bucket
    pub id: String,

    /// Serialized result
    pub result: String,

    /// Serialized args
    pub args: String,

    /// When the result was produced
    pub date: DateTime<Utc>,

    /// Overrides the store lifetime for this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_ms: Option<u64>,
}

impl CacheItem {
    /// Encode a fresh result for the given args signature
    pub fn encode<R: Serialize>(signature: &str, result: &R) -> ClientResult<Self> {
        let result = serde_json::to_string(result)
            .map_err(|e| ClientError::serialization("query result", e))?;

        Ok(Self {
            id: signature.to_string(),
            result,
            args: signature.to_string(),
            date: Utc::now(),
            lifetime_ms: None,
        })
    }

    /// Set a per-item lifetime
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime_ms = Some(u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Decode the stored result
    pub fn decode<R: DeserializeOwned>(&self) -> ClientResult<R> {
        serde_json::from_str(&self.result)
            .map_err(|e| ClientError::serialization(format!("cached result '{}'", self.id), e))
    }

    /// When this item stops being valid under the given store lifetime
    pub fn expires_at(&self, lifetime: Duration) -> DateTime<Utc> {
        let ms = self
            .lifetime_ms
            .unwrap_or_else(|| u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX));
        i64::try_from(ms)
            .ok()
            .and_then(ChronoDuration::try_milliseconds)
            .and_then(|ttl| self.date.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// `now < date + (item lifetime ?? lifetime)`
    pub fn is_valid(&self, lifetime: Duration) -> bool {
        self.is_valid_at(Utc::now(), lifetime)
    }

    /// Validity at an explicit instant
    pub fn is_valid_at(&self, now: DateTime<Utc>, lifetime: Duration) -> bool {
        now < self.expires_at(lifetime)
    }
}
