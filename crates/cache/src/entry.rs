//! The on-disk cache document.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// One cached payload. Stored as `{namespace}_{key_hash}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub namespace: String,

    /// The key as given by the caller; similarity lookup compares against it.
    pub key: String,

    pub key_hash: String,

    /// Partition inside the namespace. Lookups only see entries of their own scope.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,

    /// `null` is a valid payload ("looked up, found nothing").
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,

    pub last_accessed: DateTime<Utc>,

    #[serde(default)]
    pub hit_count: u64,

    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Set only on entries returned by a similarity lookup.
    #[serde(skip)]
    pub similarity_score: Option<f64>,
}

impl CacheEntry {
    pub fn new(
        namespace: &str,
        key: &str,
        payload: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
            key_hash: hash_key(namespace, key),
            scope: String::new(),
            payload,
            created_at: now,
            last_accessed: now,
            hit_count: 0,
            metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
            similarity_score: None,
        }
    }

    /// Move the entry into `scope`. The file hash follows the scope.
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.key_hash = scoped_hash_key(&self.namespace, scope, &self.key);
        self.scope = scope.to_string();
        self
    }

    /// An entry is live while `now - created_at < ttl`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.created_at) >= ttl
    }

    pub(crate) fn record_hit(&mut self) {
        self.hit_count += 1;
        self.last_accessed = Utc::now();
    }
}

/// Hex SHA-256 of `namespace \0 key`.
pub fn hash_key(namespace: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// File hash for `key` inside `scope`. The empty scope hashes like [`hash_key`].
pub fn scoped_hash_key(namespace: &str, scope: &str, key: &str) -> String {
    if scope.is_empty() {
        hash_key(namespace, key)
    } else {
        hash_key(namespace, &format!("{scope}\u{1f}{key}"))
    }
}

/// Convenience for configs that express TTLs in hours.
pub fn ttl_hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}
