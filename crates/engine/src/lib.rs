//! # remedium engine
//!
//! The resolution logic: interaction aggregation, evidence tier resolution,
//! the symptom pipeline state machine, the traditional medicine lookup, the
//! report orchestrator and the session-backed step-wise analysis. Every collaborator arrives as a trait
//! object, so the engine runs the same against live sources or mocks.

pub mod evidence;
pub mod interaction;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod rules;
pub mod session;
pub mod traditional;

pub use evidence::{EvidenceSettings, EvidenceTierResolver};
pub use interaction::{InteractionAggregator, dedupe, format_warnings};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use orchestrator::{AnalysisReport, AnalysisRequest, AnalysisService, ReportSettings};
pub use pipeline::{PipelineSettings, Resolution, Stage, SymptomPipeline};
pub use rules::RuleSet;
pub use session::{InMemorySessionStore, StepwiseAnalysis};
pub use traditional::{TraditionalLookup, TraditionalMedicine};

use remedium_cache::{CacheStore, ttl_hours};
use remedium_config::AppConfig;
use remedium_core::knowledge::KnowledgeBase;
use remedium_core::session::SessionStore;
use remedium_sources::SourceSet;
use std::sync::Arc;

/// Everything wired together from one configuration.
#[derive(Clone)]
pub struct Engine {
    pub analysis: AnalysisService,
    pub stepwise: Arc<StepwiseAnalysis>,
    pub metrics: Arc<PipelineMetrics>,
    pub cache: Option<CacheStore>,
}

impl Engine {
    /// Wire the engine. With `cache == None` every lookup goes to the sources.
    pub fn build(
        config: &AppConfig,
        sources: SourceSet,
        knowledge: Arc<dyn KnowledgeBase>,
        cache: Option<CacheStore>,
    ) -> Self {
        let rules = Arc::new(RuleSet::new(config.rules.clone()));
        let metrics = Arc::new(PipelineMetrics::new());

        let mut interactions =
            InteractionAggregator::new(knowledge.clone(), sources.interactions.clone(), rules.clone());
        let mut evidence = EvidenceTierResolver::new(
            sources.label.clone(),
            sources.literature.clone(),
            sources.web.clone(),
            rules.clone(),
        )
        .with_settings(EvidenceSettings::from_config(config));
        if config.generative.summarize_literature {
            evidence = evidence.with_summarizer(sources.generator.clone());
        }
        if let Some(cache) = &cache {
            interactions = interactions.with_cache(cache.clone(), ttl_hours(config.cache.ttl.registry_hours));
            evidence = evidence.with_cache(cache.clone());
        }
        let interactions = Arc::new(interactions);

        let mut pipeline = SymptomPipeline::new(
            knowledge.clone(),
            sources.generator.clone(),
            interactions.clone(),
            rules.clone(),
        )
        .with_metrics(metrics.clone())
        .with_settings(PipelineSettings::from_config(config));
        if let Some(cache) = &cache {
            pipeline = pipeline.with_cache(cache.clone());
        }
        let pipeline = Arc::new(pipeline);

        let mut traditional = TraditionalLookup::new(knowledge.clone())
            .with_registry(sources.traditional.clone())
            .with_rows(config.pipeline.max_traditional_rows);
        if let Some(cache) = &cache {
            traditional = traditional.with_cache(cache.clone(), ttl_hours(config.cache.ttl.traditional_hours));
        }

        let analysis = AnalysisService::new(
            sources.text.clone(),
            interactions,
            Arc::new(evidence),
            pipeline.clone(),
            rules.clone(),
        )
        .with_settings(ReportSettings::from_config(config))
        .with_traditional(traditional);

        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let stepwise = StepwiseAnalysis::new(store, knowledge, pipeline, rules)
            .with_candidate_limit(config.pipeline.candidate_limit);

        Self {
            analysis,
            stepwise: Arc::new(stepwise),
            metrics,
            cache,
        }
    }
}
