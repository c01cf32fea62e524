//! Interaction aggregation over the local knowledge base and the external
//! interaction registry.
//!
//! The local base is consulted first. Only when it has nothing does the
//! registry get asked, once per drug and in parallel, and every registry
//! row is cross-checked against the drugs actually requested.

use futures::future::join_all;
use remedium_cache::CacheStore;
use remedium_core::error::SourceError;
use remedium_core::interaction::{InteractionFact, PairKey, SourceOrigin, loosely_matches};
use remedium_core::knowledge::KnowledgeBase;
use remedium_core::source::{InteractionRegistry, InteractionRow};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::rules::RuleSet;

const REGISTRY_NAMESPACE: &str = "dur";

pub struct InteractionAggregator {
    knowledge: Arc<dyn KnowledgeBase>,
    registry: Arc<dyn InteractionRegistry>,
    rules: Arc<RuleSet>,
    cache: Option<CacheStore>,
    registry_ttl: Duration,
}

impl InteractionAggregator {
    pub fn new(
        knowledge: Arc<dyn KnowledgeBase>,
        registry: Arc<dyn InteractionRegistry>,
        rules: Arc<RuleSet>,
    ) -> Self {
        Self {
            knowledge,
            registry,
            rules,
            cache: None,
            registry_ttl: Duration::from_secs(168 * 3600),
        }
    }

    /// Cache registry rows per drug for `ttl`.
    pub fn with_cache(mut self, cache: CacheStore, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.registry_ttl = ttl;
        self
    }

    /// Interaction facts among `drug_names`.
    pub async fn check_interactions(&self, drug_names: &[String]) -> Vec<InteractionFact> {
        self.check_with_foods(drug_names, &[]).await
    }

    /// Interaction facts among drugs and foods. Foods are only looked up in
    /// the local knowledge base; the registry knows drugs only.
    pub async fn check_with_foods(&self, drugs: &[String], foods: &[String]) -> Vec<InteractionFact> {
        let drugs = distinct(drugs);
        let mut names = drugs.clone();
        for food in distinct(foods) {
            if !names.contains(&food) {
                names.push(food);
            }
        }
        if names.len() < 2 {
            return Vec::new();
        }

        let local = self.local_facts(&names).await;
        if !local.is_empty() {
            info!(facts = local.len(), "Interactions resolved from knowledge base");
            return dedupe(local);
        }

        if drugs.len() < 2 {
            return Vec::new();
        }
        if !self.registry.is_configured() {
            debug!(registry = self.registry.name(), "Interaction registry not configured, skipping");
            return Vec::new();
        }

        let facts = self.registry_facts(&drugs).await;
        info!(facts = facts.len(), drugs = drugs.len(), "Interactions resolved from registry");
        facts
    }

    /// Knowledge-base facts whose both sides are among `names`.
    async fn local_facts(&self, names: &[String]) -> Vec<InteractionFact> {
        let mut facts = Vec::new();
        for name in names {
            match self.knowledge.interactions_matching(name).await {
                Ok(found) => facts.extend(found.into_iter().filter(|f| pairs_within(f, names))),
                Err(e) => {
                    warn!(name = %name, knowledge = self.knowledge.name(), error = %e, "Local interaction lookup failed");
                }
            }
        }
        facts
    }

    async fn registry_facts(&self, drugs: &[String]) -> Vec<InteractionFact> {
        let lookups = drugs.iter().map(|drug| self.registry_rows(drug));
        let results = join_all(lookups).await;

        let mut facts = Vec::new();
        for (drug, result) in drugs.iter().zip(results) {
            let rows = match result {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(drug = %drug, registry = self.registry.name(), error = %e, "Registry lookup failed");
                    continue;
                }
            };
            for row in rows {
                let Some(matched) = drugs
                    .iter()
                    .find(|d| *d != drug && loosely_matches(d, &row.other_drug))
                else {
                    continue;
                };
                facts.push(self.fact_from_row(drug, matched, row));
            }
        }
        dedupe(facts)
    }

    fn fact_from_row(&self, drug: &str, matched: &str, row: InteractionRow) -> InteractionFact {
        let severity = self.rules.classify_severity(&row.reason);
        let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };
        let mut fact = InteractionFact::new(
            drug,
            matched,
            severity,
            row.reason,
            SourceOrigin::ExternalRegistry,
        );
        fact.ingredient_a = non_empty(row.ingredient_a);
        fact.ingredient_b = non_empty(row.ingredient_b);
        fact.notice_date = non_empty(row.notice_date);
        fact
    }

    /// Registry rows for one drug, through the cache. Failures are not cached.
    async fn registry_rows(&self, drug: &str) -> Result<Vec<InteractionRow>, SourceError> {
        let key = format!("dur_drug:{drug}");
        if let Some(cache) = &self.cache {
            if let Some(rows) = cache
                .get_as::<Vec<InteractionRow>>(REGISTRY_NAMESPACE, &key, self.registry_ttl)
                .await
            {
                debug!(drug, rows = rows.len(), "Registry cache hit");
                return Ok(rows);
            }
        }

        let rows = self.registry.lookup(drug).await?;
        if let Some(cache) = &self.cache {
            let metadata = serde_json::json!({ "drug": drug, "found": !rows.is_empty() });
            if let Err(e) = cache.set_as(REGISTRY_NAMESPACE, &key, &rows, Some(metadata)).await {
                warn!(drug, error = %e, "Failed to cache registry rows");
            }
        }
        Ok(rows)
    }
}

/// Trimmed, non-empty, first occurrence kept.
fn distinct(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Both sides of `fact` match two different requested names.
fn pairs_within(fact: &InteractionFact, names: &[String]) -> bool {
    names.iter().enumerate().any(|(i, a)| {
        loosely_matches(a, &fact.ref_a)
            && names
                .iter()
                .enumerate()
                .any(|(j, b)| j != i && loosely_matches(b, &fact.ref_b))
    })
}

/// Keep the first fact per unordered pair.
pub fn dedupe(facts: Vec<InteractionFact>) -> Vec<InteractionFact> {
    let mut seen: HashSet<PairKey> = HashSet::new();
    facts
        .into_iter()
        .filter(|fact| seen.insert(fact.pair_key()))
        .collect()
}

/// Human-readable warning lines, one per fact.
pub fn format_warnings(facts: &[InteractionFact]) -> Vec<String> {
    facts.iter().map(InteractionFact::render_warning).collect()
}
