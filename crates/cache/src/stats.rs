//! Cache statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub count: usize,
    pub size_bytes: u64,
}

impl NamespaceStats {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / MIB
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub file_count: usize,
    pub total_size_bytes: u64,
    pub namespaces: BTreeMap<String, NamespaceStats>,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / MIB
    }

    pub(crate) fn add(&mut self, namespace: &str, size: u64) {
        self.file_count += 1;
        self.total_size_bytes += size;
        let ns = self.namespaces.entry(namespace.to_string()).or_default();
        ns.count += 1;
        ns.size_bytes += size;
    }
}

/// Namespace of a cache file name `{namespace}_{hash}.json`.
///
/// Splits on the last underscore, so `ai_analysis_ab12.json` belongs to
/// `ai_analysis`. Returns `None` for anything that is not a cache file.
pub fn namespace_of(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".json")?;
    let (namespace, hash) = stem.rsplit_once('_')?;
    if namespace.is_empty() || hash.is_empty() {
        return None;
    }
    Some(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_split_uses_last_underscore() {
        assert_eq!(namespace_of("ai_analysis_0af3.json"), Some("ai_analysis"));
        assert_eq!(namespace_of("mfds_0af3.json"), Some("mfds"));
        assert_eq!(namespace_of("mfds_0af3.json.tmp"), None);
        assert_eq!(namespace_of("README.md"), None);
        assert_eq!(namespace_of("_abc.json"), None);
    }

    #[test]
    fn add_accumulates_per_namespace() {
        let mut stats = CacheStats::default();
        stats.add("mfds", 1024);
        stats.add("mfds", 1024);
        stats.add("ai_analysis", 512);
        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.total_size_bytes, 2560);
        assert_eq!(stats.namespaces["mfds"].count, 2);
        assert_eq!(stats.namespaces["ai_analysis"].size_bytes, 512);
    }
}
