//! File-backed cache store, one JSON document per entry.
//!
//! Storage layout: `{dir}/{namespace}_{sha256(namespace, key)}.json`.
//! Scoped entries hash `scope` into the key, so one key can live in several
//! scopes of the same namespace without colliding.
//!
//! All file I/O runs on tokio's blocking pool. Access to a single file is
//! serialised by a striped mutex set, so a hit-count update never interleaves
//! with a concurrent write of the same entry inside this process. There is no
//! cross-process lock: two processes writing the same key resolve as
//! last-writer-wins, which is harmless because entries are derived from
//! deterministic inputs. Writes go through a temp file and a rename so a
//! reader never sees a half-written document.

use chrono::Utc;
use remedium_core::error::CacheError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::entry::{CacheEntry, scoped_hash_key};
use crate::similarity::{jaccard, meets_threshold, tokenize};
use crate::stats::{CacheStats, namespace_of};

const DEFAULT_STRIPES: usize = 64;

/// Namespaced TTL cache with exact and similarity lookup.
///
/// Cheap to clone; clones share the directory and lock set.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    locks: Vec<Mutex<()>>,
}

impl CacheStore {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::with_stripes(dir, DEFAULT_STRIPES)
    }

    pub fn with_stripes(dir: impl Into<PathBuf>, stripes: usize) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            CacheError::Io(format!("Failed to create cache directory {}: {e}", dir.display()))
        })?;
        let locks = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        debug!(dir = %dir.display(), "Cache store opened");
        Ok(Self {
            inner: Arc::new(Inner { dir, locks }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Exact lookup. Expired entries are deleted and reported as a miss.
    ///
    /// `Some(Value::Null)` is a cached "nothing found", not a miss.
    pub async fn get(&self, namespace: &str, key: &str, ttl: Duration) -> Option<serde_json::Value> {
        self.get_entry(namespace, key, ttl).await.map(|e| e.payload)
    }

    /// Exact lookup returning the whole entry (after the hit is recorded).
    pub async fn get_entry(&self, namespace: &str, key: &str, ttl: Duration) -> Option<CacheEntry> {
        self.get_entry_scoped(namespace, "", key, ttl).await
    }

    /// Exact lookup of `key` inside `scope`.
    pub async fn get_entry_scoped(
        &self,
        namespace: &str,
        scope: &str,
        key: &str,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let (namespace, scope, key) = (namespace.to_string(), scope.to_string(), key.to_string());
        self.blocking(move |inner| Ok(inner.get(&namespace, &scope, &key, ttl)))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Cache lookup failed");
                None
            })
    }

    /// Similarity lookup over every live entry in `namespace`.
    ///
    /// Returns the best-scoring entry if its Jaccard score reaches
    /// `threshold`; ties go to the oldest entry. The returned entry carries
    /// `similarity_score`. Only unscoped entries are considered.
    pub async fn get_by_similarity(
        &self,
        namespace: &str,
        key: &str,
        threshold: f64,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        self.get_by_similarity_scoped(namespace, "", key, threshold, ttl)
            .await
    }

    /// Similarity lookup restricted to entries stored under exactly `scope`.
    pub async fn get_by_similarity_scoped(
        &self,
        namespace: &str,
        scope: &str,
        key: &str,
        threshold: f64,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let (namespace, scope, key) = (namespace.to_string(), scope.to_string(), key.to_string());
        self.blocking(move |inner| {
            Ok(inner.get_by_similarity(&namespace, &scope, &key, threshold, ttl))
        })
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Cache similarity lookup failed");
                None
            })
    }

    /// Insert or replace the entry for `(namespace, key)`, resetting its counters.
    pub async fn set(
        &self,
        namespace: &str,
        key: &str,
        payload: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), CacheError> {
        self.set_scoped(namespace, "", key, payload, metadata).await
    }

    /// Insert or replace the entry for `key` inside `scope`.
    pub async fn set_scoped(
        &self,
        namespace: &str,
        scope: &str,
        key: &str,
        payload: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(namespace, key, payload, metadata).with_scope(scope);
        self.blocking(move |inner| inner.write(&entry)).await
    }

    /// Whether an entry file exists, regardless of TTL.
    pub async fn exists(&self, namespace: &str, key: &str) -> bool {
        self.exists_scoped(namespace, "", key).await
    }

    pub async fn exists_scoped(&self, namespace: &str, scope: &str, key: &str) -> bool {
        let path = self
            .inner
            .path_for(namespace, &scoped_hash_key(namespace, scope, key));
        self.blocking(move |_| Ok(path.exists())).await.unwrap_or(false)
    }

    /// Remove every entry in `namespace`, returning how many were removed.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<usize, CacheError> {
        let namespace = sanitize_namespace(namespace);
        self.blocking(move |inner| inner.remove_where(|ns| ns == namespace))
            .await
    }

    /// Remove every cache entry.
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        self.blocking(|inner| inner.remove_where(|_| true)).await
    }

    /// File counts and sizes, optionally restricted to one namespace.
    pub async fn stats(&self, namespace: Option<&str>) -> Result<CacheStats, CacheError> {
        let namespace = namespace.map(sanitize_namespace);
        self.blocking(move |inner| inner.stats(namespace.as_deref()))
            .await
    }

    /// Typed exact lookup. A payload that does not decode as `T` is a miss.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Duration,
    ) -> Option<T> {
        let payload = self.get(namespace, key, ttl).await?;
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(namespace, key, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    pub async fn set_as<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_value(value)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set(namespace, key, payload, metadata).await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, CacheError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| CacheError::Io(format!("Cache worker failed: {e}")))?
    }
}

/// Namespaces become file-name prefixes; keep them to a safe alphabet.
fn sanitize_namespace(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect()
}

impl Inner {
    fn path_for(&self, namespace: &str, key_hash: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{key_hash}.json", sanitize_namespace(namespace)))
    }

    fn lock_for(&self, key_hash: &str) -> &Mutex<()> {
        let stripe = key_hash
            .get(..8)
            .and_then(|h| usize::from_str_radix(h, 16).ok())
            .unwrap_or(0);
        &self.locks[stripe % self.locks.len()]
    }

    fn get(&self, namespace: &str, scope: &str, key: &str, ttl: Duration) -> Option<CacheEntry> {
        let key_hash = scoped_hash_key(namespace, scope, key);
        let path = self.path_for(namespace, &key_hash);
        let _guard = self.lock_for(&key_hash).lock().unwrap_or_else(|p| p.into_inner());

        let mut entry = self.read_live(&path, ttl)?;
        entry.record_hit();
        if let Err(e) = self.write_unlocked(&path, &entry) {
            warn!(namespace, error = %e, "Failed to record cache hit");
        }
        debug!(namespace, key, hits = entry.hit_count, "Cache hit");
        Some(entry)
    }

    fn get_by_similarity(
        &self,
        namespace: &str,
        scope: &str,
        key: &str,
        threshold: f64,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let query = tokenize(key);
        if query.is_empty() {
            return None;
        }

        let mut candidates: Vec<(CacheEntry, PathBuf)> = self
            .files_in(namespace)
            .into_iter()
            .filter_map(|path| {
                let hash = key_hash_of(&path)?;
                let _guard = self.lock_for(&hash).lock().unwrap_or_else(|p| p.into_inner());
                self.read_live(&path, ttl).map(|entry| (entry, path))
            })
            .filter(|(entry, _)| entry.scope == scope)
            .collect();

        // Deterministic scan order: oldest first, then by file name.
        candidates.sort_by(|(a, pa), (b, pb)| a.created_at.cmp(&b.created_at).then(pa.cmp(pb)));

        let mut best: Option<(f64, usize)> = None;
        for (idx, (entry, _)) in candidates.iter().enumerate() {
            let score = jaccard(&query, &tokenize(&entry.key));
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, idx));
            }
        }

        let (score, idx) = best?;
        if !meets_threshold(score, threshold) {
            debug!(namespace, key, best_score = score, "Similarity cache miss");
            return None;
        }

        let (entry, path) = candidates.swap_remove(idx);
        let mut entry = {
            let _guard = self.lock_for(&entry.key_hash).lock().unwrap_or_else(|p| p.into_inner());
            // Re-read under the lock so concurrent hits are not lost.
            let mut fresh = self.read_live(&path, ttl).unwrap_or(entry);
            fresh.record_hit();
            if let Err(e) = self.write_unlocked(&path, &fresh) {
                warn!(namespace, error = %e, "Failed to record cache hit");
            }
            fresh
        };
        entry.similarity_score = Some(score);
        debug!(namespace, key, matched = %entry.key, score, "Similarity cache hit");
        Some(entry)
    }

    /// Read an entry, deleting it if expired or unreadable. Caller holds the lock.
    fn read_live(&self, path: &Path, ttl: Duration) -> Option<CacheEntry> {
        let content = std::fs::read_to_string(path).ok()?;
        let entry = match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted cache entry");
                return None;
            }
        };
        if entry.is_expired(ttl, Utc::now()) {
            debug!(namespace = %entry.namespace, key = %entry.key, "Cache entry expired");
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to purge expired cache entry");
            }
            return None;
        }
        Some(entry)
    }

    fn write(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.path_for(&entry.namespace, &entry.key_hash);
        let _guard = self.lock_for(&entry.key_hash).lock().unwrap_or_else(|p| p.into_inner());
        self.write_unlocked(&path, entry)
    }

    fn write_unlocked(&self, path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        let content = serde_json::to_string_pretty(entry)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| CacheError::Io(format!("Failed to write cache file: {e}")))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| CacheError::Io(format!("Failed to move cache file into place: {e}")))
    }

    fn files_in(&self, namespace: &str) -> Vec<PathBuf> {
        let namespace = sanitize_namespace(namespace);
        self.cache_files()
            .into_iter()
            .filter(|(ns, _, _)| *ns == namespace)
            .map(|(_, path, _)| path)
            .collect()
    }

    /// Every cache file as `(namespace, path, size)`.
    fn cache_files(&self) -> Vec<(String, PathBuf, u64)> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Cannot list cache directory");
                return Vec::new();
            }
        };
        read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let namespace = namespace_of(&name)?.to_string();
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                Some((namespace, entry.path(), size))
            })
            .collect()
    }

    fn remove_where(&self, matches: impl Fn(&str) -> bool) -> Result<usize, CacheError> {
        let mut removed = 0;
        for (namespace, path, _) in self.cache_files() {
            if !matches(&namespace) {
                continue;
            }
            let Some(hash) = key_hash_of(&path) else { continue };
            let _guard = self.lock_for(&hash).lock().unwrap_or_else(|p| p.into_inner());
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete cache file"),
            }
        }
        Ok(removed)
    }

    fn stats(&self, namespace: Option<&str>) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for (ns, _, size) in self.cache_files() {
            if namespace.is_some_and(|wanted| wanted != ns) {
                continue;
            }
            stats.add(&ns, size);
        }
        Ok(stats)
    }
}

fn key_hash_of(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('_').map(|(_, hash)| hash.to_string())
}
