//! Counters for the symptom pipeline.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    total: AtomicU64,
    exact_cache_hits: AtomicU64,
    similarity_cache_hits: AtomicU64,
    exact_matches: AtomicU64,
    fuzzy_matches: AtomicU64,
    generative_successes: AtomicU64,
    generative_failures: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub exact_cache_hits: u64,
    pub similarity_cache_hits: u64,
    pub exact_matches: u64,
    pub fuzzy_matches: u64,
    pub generative_successes: u64,
    pub generative_failures: u64,
    pub errors: u64,
    /// Share of calls answered from cache, 0.0 to 1.0.
    pub cache_hit_rate: f64,
    /// Share of calls that reached the generative state.
    pub fallback_rate: f64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        bump(&self.total);
    }

    pub fn record_exact_cache_hit(&self) {
        bump(&self.exact_cache_hits);
    }

    pub fn record_similarity_cache_hit(&self) {
        bump(&self.similarity_cache_hits);
    }

    pub fn record_exact_match(&self) {
        bump(&self.exact_matches);
    }

    pub fn record_fuzzy_match(&self) {
        bump(&self.fuzzy_matches);
    }

    pub fn record_generative(&self, success: bool) {
        if success {
            bump(&self.generative_successes);
        } else {
            bump(&self.generative_failures);
        }
    }

    pub fn record_error(&self) {
        bump(&self.errors);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let total = load(&self.total);
        let exact_cache_hits = load(&self.exact_cache_hits);
        let similarity_cache_hits = load(&self.similarity_cache_hits);
        let generative_successes = load(&self.generative_successes);
        let generative_failures = load(&self.generative_failures);

        let rate = |n: u64| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        MetricsSnapshot {
            total,
            exact_cache_hits,
            similarity_cache_hits,
            exact_matches: load(&self.exact_matches),
            fuzzy_matches: load(&self.fuzzy_matches),
            generative_successes,
            generative_failures,
            errors: load(&self.errors),
            cache_hit_rate: rate(exact_cache_hits + similarity_cache_hits),
            fallback_rate: rate(generative_successes + generative_failures),
        }
    }
}
