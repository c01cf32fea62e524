//! Traditional medicine section of a report.
//!
//! Two sources feed it. The knowledge base holds prescriptions curated for
//! a symptom; the registry is searched with the first two drug names and
//! also supplies Korean-medicine papers. Knowledge-base rows come first and
//! registry rows with an already listed code are dropped.

use remedium_cache::CacheStore;
use remedium_core::knowledge::KnowledgeBase;
use remedium_core::source::{
    TkmPaper, TraditionalMedicineSearch, TraditionalPrescription, TraditionalSearchResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const TRADITIONAL_NAMESPACE: &str = "simpre";

/// Drug names combined into one registry query.
const QUERY_DRUGS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraditionalMedicine {
    pub prescriptions: Vec<TraditionalPrescription>,
    pub papers: Vec<TkmPaper>,
}

impl TraditionalMedicine {
    pub fn is_empty(&self) -> bool {
        self.prescriptions.is_empty() && self.papers.is_empty()
    }

    /// Knowledge-base rows first, then registry rows not already listed.
    pub fn merge(curated: Vec<TraditionalPrescription>, registry: Option<TraditionalSearchResult>) -> Self {
        let mut prescriptions = curated;
        let mut papers = Vec::new();
        if let Some(found) = registry {
            for row in found.prescriptions {
                if !prescriptions.iter().any(|p| same_prescription(p, &row)) {
                    prescriptions.push(row);
                }
            }
            papers = found.papers;
        }
        Self {
            prescriptions,
            papers,
        }
    }
}

fn same_prescription(a: &TraditionalPrescription, b: &TraditionalPrescription) -> bool {
    if !a.code.is_empty() && !b.code.is_empty() {
        a.code == b.code
    } else {
        a.name.trim() == b.name.trim()
    }
}

/// `simpre:{query}:{rows}`, the registry cache key.
pub fn registry_cache_key(query: &str, rows: usize) -> String {
    format!("simpre:{query}:{rows}")
}

/// The registry query for a drug list, or `None` when there are no drugs.
pub fn registry_query(drugs: &[String]) -> Option<String> {
    let names: Vec<&str> = drugs
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .take(QUERY_DRUGS)
        .collect();
    (!names.is_empty()).then(|| names.join(" "))
}

pub struct TraditionalLookup {
    knowledge: Arc<dyn KnowledgeBase>,
    registry: Option<Arc<dyn TraditionalMedicineSearch>>,
    cache: Option<CacheStore>,
    ttl: Duration,
    rows: usize,
}

impl TraditionalLookup {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            knowledge,
            registry: None,
            cache: None,
            ttl: Duration::from_secs(24 * 3600),
            rows: 3,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn TraditionalMedicineSearch>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.ttl = ttl;
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows.max(1);
        self
    }

    /// Prescriptions curated for the first knowledge-base symptom whose
    /// name matches `symptom`. Lookup failures read as none.
    pub async fn for_symptom(&self, symptom: &str) -> Vec<TraditionalPrescription> {
        let symptom = symptom.trim();
        if symptom.is_empty() {
            return Vec::new();
        }
        let row = match self.knowledge.find_symptoms(symptom, 1).await {
            Ok(rows) => rows.into_iter().next(),
            Err(e) => {
                warn!(symptom, error = %e, "Symptom lookup for traditional prescriptions failed");
                None
            }
        };
        let Some(row) = row else {
            return Vec::new();
        };
        match self.knowledge.traditional_prescriptions_for(row.id, self.rows).await {
            Ok(found) => found,
            Err(e) => {
                warn!(symptom_id = row.id, error = %e, "Traditional prescription lookup failed");
                Vec::new()
            }
        }
    }

    /// Registry search with the first two drug names, through the cache.
    /// Errors and an unconfigured registry read as no result and are not
    /// cached.
    pub async fn for_drugs(&self, drugs: &[String]) -> Option<TraditionalSearchResult> {
        let registry = self.registry.as_ref()?;
        let query = registry_query(drugs)?;
        let key = registry_cache_key(&query, self.rows);

        if let Some(cache) = &self.cache {
            if let Some(found) = cache
                .get_as::<TraditionalSearchResult>(TRADITIONAL_NAMESPACE, &key, self.ttl)
                .await
            {
                debug!(query, "Traditional registry cache hit");
                return Some(found);
            }
        }
        if !registry.is_configured() {
            return None;
        }

        match registry.search(&query, self.rows).await {
            Ok(found) => {
                if let Some(cache) = &self.cache {
                    let metadata = serde_json::json!({
                        "query": query,
                        "prescriptions": found.total_prescriptions,
                        "papers": found.total_papers,
                    });
                    if let Err(e) = cache.set_as(TRADITIONAL_NAMESPACE, &key, &found, Some(metadata)).await {
                        warn!(query, error = %e, "Failed to cache traditional registry result");
                    }
                }
                Some(found)
            }
            Err(e) => {
                warn!(query, source = registry.name(), error = %e, "Traditional registry search failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remedium_core::error::SourceError;
    use remedium_core::knowledge::SymptomRow;
    use remedium_knowledge::InMemoryKnowledgeBase;
    use std::sync::Mutex;

    struct MockRegistry {
        result: Result<TraditionalSearchResult, SourceError>,
        queries: Mutex<Vec<String>>,
        call_count: Mutex<usize>,
    }

    impl MockRegistry {
        fn answering(result: TraditionalSearchResult) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(result),
                queries: Mutex::new(Vec::new()),
                call_count: Mutex::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                result: Err(SourceError::Network("connection reset".into())),
                queries: Mutex::new(Vec::new()),
                call_count: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl TraditionalMedicineSearch for MockRegistry {
        fn name(&self) -> &str {
            "mock_simpre"
        }

        async fn search(&self, query: &str, _: usize) -> Result<TraditionalSearchResult, SourceError> {
            *self.call_count.lock().unwrap() += 1;
            self.queries.lock().unwrap().push(query.to_string());
            self.result.clone()
        }
    }

    fn formula(code: &str, name: &str, source: &str) -> TraditionalPrescription {
        TraditionalPrescription {
            code: code.into(),
            name: name.into(),
            ingredients: String::new(),
            source: source.into(),
        }
    }

    fn registry_answer() -> TraditionalSearchResult {
        TraditionalSearchResult {
            query: "Aspirin Warfarin".into(),
            prescriptions: vec![formula("P0412", "반하사심탕", "KOREANTK"), formula("P0077", "평위산", "KOREANTK")],
            papers: vec![TkmPaper {
                title: "평위산 연구".into(),
                published: "2021-03-15".into(),
                ..Default::default()
            }],
            total_prescriptions: 2,
            total_papers: 1,
        }
    }

    fn indigestion_kb() -> Arc<dyn KnowledgeBase> {
        Arc::new(
            InMemoryKnowledgeBase::new()
                .with_symptom(SymptomRow {
                    id: 4,
                    name: "소화불량".into(),
                    reading: String::new(),
                    english_name: "Dyspepsia".into(),
                    aliases: vec![],
                    category: String::new(),
                    description: String::new(),
                })
                .with_traditional_prescription(4, formula("P0412", "반하사심탕", "local_kb")),
        )
    }

    #[test]
    fn query_uses_first_two_named_drugs() {
        let drugs = vec![" ".into(), "Aspirin".into(), "Warfarin".into(), "Metformin".into()];
        assert_eq!(registry_query(&drugs).as_deref(), Some("Aspirin Warfarin"));
        assert_eq!(registry_query(&[]), None);
        assert_eq!(registry_cache_key("Aspirin Warfarin", 3), "simpre:Aspirin Warfarin:3");
    }

    #[tokio::test]
    async fn symptom_prescriptions_come_from_the_knowledge_base() {
        let lookup = TraditionalLookup::new(indigestion_kb());
        let rows = lookup.for_symptom("Dyspepsia").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "local_kb");
        assert!(lookup.for_symptom("두통").await.is_empty());
        assert!(lookup.for_symptom("  ").await.is_empty());
    }

    #[tokio::test]
    async fn registry_results_are_cached_per_query() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let registry = MockRegistry::answering(registry_answer());
        let lookup = TraditionalLookup::new(indigestion_kb())
            .with_registry(registry.clone())
            .with_cache(cache.clone(), Duration::from_secs(3600));

        let drugs = vec!["Aspirin".to_string(), "Warfarin".to_string(), "Metformin".to_string()];
        assert!(lookup.for_drugs(&drugs).await.is_some());
        let again = lookup.for_drugs(&drugs).await.unwrap();
        assert_eq!(again.papers[0].title, "평위산 연구");
        assert_eq!(registry.calls(), 1);
        assert_eq!(*registry.queries.lock().unwrap(), vec!["Aspirin Warfarin"]);
        assert!(cache.exists(TRADITIONAL_NAMESPACE, "simpre:Aspirin Warfarin:3").await);
    }

    #[tokio::test]
    async fn registry_failures_read_as_nothing_and_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let registry = MockRegistry::failing();
        let lookup = TraditionalLookup::new(indigestion_kb())
            .with_registry(registry.clone())
            .with_cache(cache.clone(), Duration::from_secs(3600));

        let drugs = vec!["Aspirin".to_string()];
        assert!(lookup.for_drugs(&drugs).await.is_none());
        assert!(lookup.for_drugs(&drugs).await.is_none());
        assert_eq!(registry.calls(), 2);
        assert!(!cache.exists(TRADITIONAL_NAMESPACE, "simpre:Aspirin:3").await);
    }

    #[tokio::test]
    async fn no_drugs_means_no_registry_call() {
        let registry = MockRegistry::answering(registry_answer());
        let lookup = TraditionalLookup::new(indigestion_kb()).with_registry(registry.clone());
        assert!(lookup.for_drugs(&[]).await.is_none());
        assert_eq!(registry.calls(), 0);
    }

    #[test]
    fn merge_keeps_curated_rows_first_without_duplicates() {
        let curated = vec![formula("P0412", "반하사심탕", "local_kb")];
        let merged = TraditionalMedicine::merge(curated, Some(registry_answer()));
        let names: Vec<_> = merged.prescriptions.iter().map(|p| (p.name.as_str(), p.source.as_str())).collect();
        assert_eq!(names, vec![("반하사심탕", "local_kb"), ("평위산", "KOREANTK")]);
        assert_eq!(merged.papers.len(), 1);

        let empty = TraditionalMedicine::merge(Vec::new(), None);
        assert!(empty.is_empty());
    }
}
