//! Evidence tier resolution.
//!
//! For every subject the authoritative label registry and the literature
//! search are fetched at the same time. Only subjects for which both came
//! back empty are escalated to the web tier, as one more parallel batch.

use futures::future::join_all;
use remedium_cache::{CacheStore, ttl_hours};
use remedium_config::AppConfig;
use remedium_core::evidence::{Citation, EvidenceRecord, EvidenceTier};
use remedium_core::source::{
    DrugLabel, GenerativeClient, LabelRegistry, LiteratureSearch, Paper, WebQuery, WebSearch,
    WebSearchResponse,
};
use remedium_sources::truncate;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::rules::{RuleSet, clean_html};

const LABEL_NAMESPACE: &str = "mfds";
const LITERATURE_NAMESPACE: &str = "pubmed";
const WEB_NAMESPACE: &str = "tavily";

/// Characters of an abstract used as efficacy text when no summary exists.
const ABSTRACT_FALLBACK_CHARS: usize = 120;

const SUMMARY_SCHEMA: &str = r#"{"efficacy": "one or two sentences on what the drug treats", "caution": "one or two sentences on the main risks"}"#;

/// Tunables for the resolver, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EvidenceSettings {
    pub label_ttl: Duration,
    pub literature_ttl: Duration,
    pub web_ttl: Duration,
    pub max_papers: usize,
    pub trusted_domains: Vec<String>,
    pub web_max_results: usize,
    pub web_content_chars: usize,
    pub summary_chars: usize,
    pub max_citations: usize,
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl EvidenceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let ttl = &config.cache.ttl;
        Self {
            label_ttl: ttl_hours(ttl.label_hours),
            literature_ttl: ttl_hours(ttl.literature_hours),
            web_ttl: ttl_hours(ttl.web_hours),
            max_papers: config.pipeline.max_papers,
            trusted_domains: config.web.trusted_domains.clone(),
            web_max_results: config.web.max_results,
            web_content_chars: config.web.content_chars,
            summary_chars: config.web.summary_chars,
            max_citations: config.web.max_citations,
        }
    }
}

/// Result of the first, concurrent phase for one subject.
struct PrimaryEvidence {
    label: Option<DrugLabel>,
    papers: Vec<Paper>,
}

impl PrimaryEvidence {
    fn is_empty(&self) -> bool {
        self.label.is_none() && self.papers.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
struct LiteratureSummary {
    #[serde(default)]
    efficacy: String,
    #[serde(default)]
    caution: String,
}

pub struct EvidenceTierResolver {
    label: Arc<dyn LabelRegistry>,
    literature: Arc<dyn LiteratureSearch>,
    web: Arc<dyn WebSearch>,
    summarizer: Option<Arc<dyn GenerativeClient>>,
    cache: Option<CacheStore>,
    rules: Arc<RuleSet>,
    settings: EvidenceSettings,
}

impl EvidenceTierResolver {
    pub fn new(
        label: Arc<dyn LabelRegistry>,
        literature: Arc<dyn LiteratureSearch>,
        web: Arc<dyn WebSearch>,
        rules: Arc<RuleSet>,
    ) -> Self {
        Self {
            label,
            literature,
            web,
            summarizer: None,
            cache: None,
            rules,
            settings: EvidenceSettings::default(),
        }
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Summarise literature hits into efficacy / caution text.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn GenerativeClient>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_settings(mut self, settings: EvidenceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// One record per subject, in input order. Unresolvable subjects get the
    /// `NONE` sentinel record.
    pub async fn resolve_bulk(&self, subjects: &[String]) -> Vec<EvidenceRecord> {
        if subjects.is_empty() {
            return Vec::new();
        }

        // Phase 1: authoritative + literature, every subject at once.
        let primary = join_all(subjects.iter().map(|name| async move {
            let (label, papers) = tokio::join!(self.fetch_label(name), self.fetch_literature(name));
            PrimaryEvidence { label, papers }
        }))
        .await;

        // Phase 2: web tier, only for the residue.
        let residue: Vec<usize> = primary
            .iter()
            .enumerate()
            .filter(|(_, evidence)| evidence.is_empty())
            .map(|(i, _)| i)
            .collect();
        if !residue.is_empty() {
            info!(
                escalated = residue.len(),
                total = subjects.len(),
                "Escalating unresolved subjects to web tier"
            );
        }
        let web_results = join_all(residue.iter().map(|&i| self.fetch_web(&subjects[i]))).await;
        let mut web: HashMap<usize, WebSearchResponse> = residue
            .into_iter()
            .zip(web_results)
            .filter_map(|(i, response)| response.map(|r| (i, r)))
            .collect();

        let mut records = Vec::with_capacity(subjects.len());
        for (i, (name, evidence)) in subjects.iter().zip(primary).enumerate() {
            let record = self.merge(name, evidence, web.remove(&i)).await;
            debug!(subject = %name, tier = ?record.tier, "Evidence resolved");
            records.push(record);
        }
        records
    }

    /// [`resolve_bulk`](Self::resolve_bulk) keyed by subject name.
    pub async fn resolve_bulk_map(&self, subjects: &[String]) -> HashMap<String, EvidenceRecord> {
        self.resolve_bulk(subjects)
            .await
            .into_iter()
            .map(|record| (record.subject_name.clone(), record))
            .collect()
    }

    pub async fn resolve(&self, subject: &str) -> EvidenceRecord {
        self.resolve_bulk(&[subject.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| EvidenceRecord::no_data(subject))
    }

    async fn merge(
        &self,
        name: &str,
        evidence: PrimaryEvidence,
        web: Option<WebSearchResponse>,
    ) -> EvidenceRecord {
        let literature_citations = self.paper_citations(&evidence.papers);

        if let Some(label) = evidence.label {
            let risk = [&label.precautions, &label.warn_precautions, &label.side_effects]
                .into_iter()
                .find(|text| !text.trim().is_empty())
                .map(|text| clean_html(text))
                .unwrap_or_default();
            let manufacturer = Some(label.manufacturer.clone()).filter(|m| !m.is_empty());
            return EvidenceRecord {
                subject_name: name.to_string(),
                tier: EvidenceTier::Authoritative,
                efficacy_summary: clean_html(&label.efficacy),
                risk_summary: risk,
                citations: literature_citations,
                manufacturer,
            };
        }

        if !evidence.papers.is_empty() {
            let summary = self.summarize_papers(name, &evidence.papers).await;
            return EvidenceRecord {
                subject_name: name.to_string(),
                tier: EvidenceTier::Literature,
                efficacy_summary: summary.efficacy,
                risk_summary: summary.caution,
                citations: literature_citations,
                manufacturer: None,
            };
        }

        match web {
            Some(response) if !response.is_empty() => self.web_record(name, response),
            _ => EvidenceRecord::no_data(name),
        }
    }

    fn paper_citations(&self, papers: &[Paper]) -> Vec<Citation> {
        papers
            .iter()
            .filter(|p| !p.title.is_empty() && !p.url.is_empty())
            .take(self.settings.max_citations)
            .map(|p| Citation {
                title: p.title.clone(),
                url: p.url.clone(),
            })
            .collect()
    }

    fn web_record(&self, name: &str, response: WebSearchResponse) -> EvidenceRecord {
        let efficacy = if !response.answer.trim().is_empty() {
            response.answer.trim().to_string()
        } else {
            response
                .results
                .iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .map(|page| page.content.trim().to_string())
                .unwrap_or_default()
        };
        let citations = response
            .results
            .iter()
            .filter(|page| !page.title.is_empty() && !page.url.is_empty())
            .take(self.settings.max_citations)
            .map(|page| Citation {
                title: page.title.clone(),
                url: page.url.clone(),
            })
            .collect();

        EvidenceRecord {
            subject_name: name.to_string(),
            tier: EvidenceTier::Web,
            efficacy_summary: truncate(&efficacy, self.settings.summary_chars),
            risk_summary: String::new(),
            citations,
            manufacturer: None,
        }
    }

    async fn summarize_papers(&self, name: &str, papers: &[Paper]) -> LiteratureSummary {
        if let Some(summarizer) = &self.summarizer {
            let context = papers
                .iter()
                .map(|p| format!("- {}: {}", p.title, p.abstract_text))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = format!(
                "Summarise for a patient what the drug '{name}' is used for and its main \
                 risks, based only on these paper abstracts:\n{context}"
            );
            match summarizer.generate(&prompt, SUMMARY_SCHEMA).await {
                Ok(value) => match serde_json::from_value::<LiteratureSummary>(value) {
                    Ok(summary) if !summary.efficacy.trim().is_empty() => return summary,
                    Ok(_) => warn!(subject = name, "Literature summary came back empty"),
                    Err(e) => warn!(subject = name, error = %e, "Literature summary has unexpected shape"),
                },
                Err(e) => warn!(subject = name, source = summarizer.name(), error = %e, "Literature summary failed"),
            }
        }

        let best = papers
            .iter()
            .find(|p| !p.abstract_text.trim().is_empty())
            .map(|p| p.abstract_text.as_str())
            .or_else(|| papers.first().map(|p| p.title.as_str()))
            .unwrap_or_default();
        LiteratureSummary {
            efficacy: truncate(best.trim(), ABSTRACT_FALLBACK_CHARS),
            caution: String::new(),
        }
    }

    /// Authoritative tier for one subject, through the cache.
    ///
    /// A definitive "nothing found" is cached as `null`; transport failures
    /// are not cached.
    async fn fetch_label(&self, name: &str) -> Option<DrugLabel> {
        let key = format!("mfds_easy:{name}");
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache
                .get_as::<Option<DrugLabel>>(LABEL_NAMESPACE, &key, self.settings.label_ttl)
                .await
            {
                debug!(subject = name, found = cached.is_some(), "Label cache hit");
                return cached;
            }
        }
        if !self.label.is_configured() {
            debug!(subject = name, "Label registry not configured");
            return None;
        }

        let mut failed = false;
        let mut found = None;
        for variant in self.rules.name_variants(name) {
            match self.label.search(&variant).await {
                Ok(rows) if !rows.is_empty() => {
                    found = select_label(&variant, rows);
                    if found.is_some() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(subject = name, variant = %variant, source = self.label.name(), error = %e, "Label lookup failed");
                    failed = true;
                }
            }
        }

        if let Some(cache) = &self.cache {
            if found.is_some() || !failed {
                let metadata = serde_json::json!({ "drug": name, "found": found.is_some() });
                if let Err(e) = cache.set_as(LABEL_NAMESPACE, &key, &found, Some(metadata)).await {
                    warn!(subject = name, error = %e, "Failed to cache label");
                }
            }
        }
        found
    }

    /// Literature tier for one subject, through the cache.
    async fn fetch_literature(&self, name: &str) -> Vec<Paper> {
        let query = format!("{name} mechanism side effects");
        let key = format!("pubmed:{query}");
        if let Some(cache) = &self.cache {
            if let Some(papers) = cache
                .get_as::<Vec<Paper>>(LITERATURE_NAMESPACE, &key, self.settings.literature_ttl)
                .await
            {
                debug!(subject = name, papers = papers.len(), "Literature cache hit");
                return papers;
            }
        }
        if !self.literature.is_configured() {
            return Vec::new();
        }

        match self.literature.search(&query, self.settings.max_papers).await {
            Ok(papers) => {
                if let Some(cache) = &self.cache {
                    let metadata = serde_json::json!({ "query": query, "count": papers.len() });
                    if let Err(e) = cache.set_as(LITERATURE_NAMESPACE, &key, &papers, Some(metadata)).await {
                        warn!(subject = name, error = %e, "Failed to cache literature");
                    }
                }
                papers
            }
            Err(e) => {
                warn!(subject = name, source = self.literature.name(), error = %e, "Literature search failed");
                Vec::new()
            }
        }
    }

    /// Web tier for one subject, through the cache.
    async fn fetch_web(&self, name: &str) -> Option<WebSearchResponse> {
        let key = format!("tavily_drug:{name}");
        if let Some(cache) = &self.cache {
            if let Some(response) = cache
                .get_as::<WebSearchResponse>(WEB_NAMESPACE, &key, self.settings.web_ttl)
                .await
            {
                debug!(subject = name, "Web cache hit");
                return Some(response);
            }
        }
        if !self.web.is_configured() {
            return None;
        }

        let query = WebQuery {
            query: format!("{name} 효능 부작용 복용법 주의사항"),
            include_domains: self.settings.trusted_domains.clone(),
            max_results: self.settings.web_max_results,
            include_answer: true,
        };
        match self.web.search(&query).await {
            Ok(mut response) => {
                for page in &mut response.results {
                    page.content = truncate(&page.content, self.settings.web_content_chars);
                }
                if let Some(cache) = &self.cache {
                    let metadata = serde_json::json!({ "drug": name, "found": !response.is_empty() });
                    if let Err(e) = cache.set_as(WEB_NAMESPACE, &key, &response, Some(metadata)).await {
                        warn!(subject = name, error = %e, "Failed to cache web result");
                    }
                }
                Some(response)
            }
            Err(e) => {
                warn!(subject = name, source = self.web.name(), error = %e, "Web search failed");
                None
            }
        }
    }
}

/// Exact (case-insensitive) item name, else an item name containing the
/// query, else the first row.
pub fn select_label(query: &str, rows: Vec<DrugLabel>) -> Option<DrugLabel> {
    let query = query.to_lowercase();
    let exact = rows.iter().position(|r| r.item_name.to_lowercase() == query);
    let containing = || rows.iter().position(|r| r.item_name.to_lowercase().contains(&query));
    let index = exact.or_else(containing).unwrap_or(0);
    rows.into_iter().nth(index)
}
