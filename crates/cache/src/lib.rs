//! Cache store for remedium.
//!
//! A namespaced, TTL-based key/value cache persisted as one JSON file per
//! entry, with an additional similarity lookup mode so paraphrased inputs can
//! share an expensive result.

pub mod entry;
pub mod similarity;
pub mod stats;
pub mod store;

pub use entry::{CacheEntry, hash_key, scoped_hash_key, ttl_hours};
pub use similarity::{jaccard, key_similarity, tokenize};
pub use stats::{CacheStats, NamespaceStats};
pub use store::CacheStore;
