//! Symptom resolution pipeline.
//!
//! One call walks a fixed state machine:
//!
//! ```text
//! CacheCheck ─hit──────────────────────────────────────────────▶ Done
//!     │miss
//! ExactMatch ─found─▶ Enrich ─remedies─▶ InteractionCheck ─▶ Done
//!     │none             │none                 ▲
//! FuzzyMatch ─found─────┘                     │
//!     │none                                   │
//! Generative ─ok──────────────────────────────┘
//!     │failure
//!   Error
//! ```
//!
//! Every collaborator failure is absorbed inside its stage. Only the
//! generative stage, or a broken invariant in the machine itself, routes to
//! `Error`, which returns the degraded result instead of an error.

use remedium_cache::{CacheStore, ttl_hours};
use remedium_config::AppConfig;
use remedium_core::error::{Error, SourceError};
use remedium_core::knowledge::{KnowledgeBase, SymptomRow};
use remedium_core::recommendation::{
    Ingredient, Polarity, Provenance, Recipe, RecommendationResult,
};
use remedium_core::source::GenerativeClient;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::interaction::InteractionAggregator;
use crate::metrics::PipelineMetrics;
use crate::rules::RuleSet;

pub const ANALYSIS_NAMESPACE: &str = "ai_analysis";

const GENERATED_EVIDENCE_LEVEL: &str = "generated";

const PLAN_SCHEMA: &str = r#"{
  "summary": "two or three sentences for the patient",
  "condition": "the most likely underlying condition, one short name",
  "ingredients": [{"name": "food name", "rationale": "why it helps or hurts", "polarity": "recommend | neutral | caution | avoid"}],
  "recipes": [{"title": "dish name", "description": "how to prepare it", "meal_slot": "breakfast | lunch | dinner | snack", "rationale": "why it fits"}]
}"#;

/// States of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CacheCheck,
    ExactMatch,
    FuzzyMatch,
    Enrich,
    Generative,
    InteractionCheck,
    Done,
    Error,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub analysis_ttl: Duration,
    pub similarity_threshold: f64,
    pub symptom_search_limit: usize,
    pub max_kb_remedies: usize,
    pub max_kb_recipes: usize,
    pub max_generated_ingredients: usize,
    pub max_generated_recipes: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let pipeline = &config.pipeline;
        Self {
            analysis_ttl: ttl_hours(config.cache.ttl.analysis_hours),
            similarity_threshold: config.cache.similarity_threshold,
            symptom_search_limit: pipeline.symptom_search_limit,
            max_kb_remedies: pipeline.max_kb_remedies,
            max_kb_recipes: pipeline.max_kb_recipes,
            max_generated_ingredients: pipeline.max_generated_ingredients,
            max_generated_recipes: pipeline.max_generated_recipes,
        }
    }
}

/// The result of a run plus the stages it went through.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: RecommendationResult,
    pub path: Vec<Stage>,
}

impl Resolution {
    pub fn visited(&self, stage: Stage) -> bool {
        self.path.contains(&stage)
    }
}

/// Mutable state carried between stages of one run.
struct Run<'a> {
    text: &'a str,
    drugs: &'a [String],
    cache_scope: String,
    matched: Option<SymptomRow>,
    provenance: Provenance,
    result: Option<RecommendationResult>,
    from_cache: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedPlan {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    condition: String,
    #[serde(default)]
    ingredients: Vec<GeneratedIngredient>,
    #[serde(default)]
    recipes: Vec<GeneratedRecipe>,
}

#[derive(Debug, Deserialize)]
struct GeneratedIngredient {
    name: String,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    polarity: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedRecipe {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    meal_slot: Option<String>,
    #[serde(default)]
    rationale: String,
}

pub struct SymptomPipeline {
    knowledge: Arc<dyn KnowledgeBase>,
    generator: Arc<dyn GenerativeClient>,
    interactions: Arc<InteractionAggregator>,
    rules: Arc<RuleSet>,
    cache: Option<CacheStore>,
    metrics: Arc<PipelineMetrics>,
    settings: PipelineSettings,
}

impl SymptomPipeline {
    pub fn new(
        knowledge: Arc<dyn KnowledgeBase>,
        generator: Arc<dyn GenerativeClient>,
        interactions: Arc<InteractionAggregator>,
        rules: Arc<RuleSet>,
    ) -> Self {
        Self {
            knowledge,
            generator,
            interactions,
            rules,
            cache: None,
            metrics: Arc::new(PipelineMetrics::new()),
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Resolve symptom text (and optional drugs) into a recommendation.
    pub async fn resolve(&self, text: &str, drugs: &[String]) -> RecommendationResult {
        self.run(text, drugs).await.result
    }

    /// Like [`resolve`](Self::resolve) but also reports the stage path.
    pub async fn run(&self, text: &str, drugs: &[String]) -> Resolution {
        self.metrics.record_request();
        let text = text.trim();
        let mut path = Vec::new();

        if text.is_empty() && drugs.is_empty() {
            warn!("Nothing to resolve: no symptom text and no drugs");
            self.metrics.record_error();
            path.push(Stage::Error);
            return Resolution {
                result: RecommendationResult::degraded(),
                path,
            };
        }

        let mut run = Run {
            text,
            drugs,
            cache_scope: analysis_scope(drugs),
            matched: None,
            provenance: Provenance::Generative,
            result: None,
            from_cache: false,
        };

        let mut stage = Stage::CacheCheck;
        loop {
            path.push(stage);
            debug!(stage = ?stage, "Pipeline stage");
            let next = match stage {
                Stage::CacheCheck => self.cache_check(&mut run).await,
                Stage::ExactMatch => self.exact_match(&mut run).await,
                Stage::FuzzyMatch => self.fuzzy_match(&mut run).await,
                Stage::Enrich => self.enrich(&mut run).await,
                Stage::Generative => self.generative(&mut run).await,
                Stage::InteractionCheck => self.interaction_check(&mut run).await,
                Stage::Done | Stage::Error => break,
            };
            stage = next.unwrap_or_else(|e| {
                error!(stage = ?stage, error = %e, "Symptom pipeline failed");
                Stage::Error
            });
        }

        let result = match (stage, run.result) {
            (Stage::Done, Some(result)) => {
                if !run.from_cache {
                    self.store(&run.cache_scope, &result, text, drugs).await;
                }
                info!(
                    provenance = ?result.provenance,
                    confidence = ?result.confidence,
                    ingredients = result.ingredients.len(),
                    cautions = result.cautions.len(),
                    "Symptom resolved"
                );
                result
            }
            _ => {
                self.metrics.record_error();
                RecommendationResult::degraded()
            }
        };
        Resolution { result, path }
    }

    async fn cache_check(&self, run: &mut Run<'_>) -> Result<Stage, Error> {
        let Some(cache) = &self.cache else {
            return Ok(Stage::ExactMatch);
        };
        let ttl = self.settings.analysis_ttl;
        let scope = run.cache_scope.as_str();

        if let Some(entry) = cache
            .get_entry_scoped(ANALYSIS_NAMESPACE, scope, run.text, ttl)
            .await
        {
            match serde_json::from_value::<RecommendationResult>(entry.payload) {
                Ok(hit) => {
                    debug!(key = run.text, scope, "Analysis cache hit");
                    self.metrics.record_exact_cache_hit();
                    run.result = Some(hit.into_cache_hit());
                    run.from_cache = true;
                    return Ok(Stage::Done);
                }
                Err(e) => warn!(key = run.text, error = %e, "Cached analysis has unexpected shape"),
            }
        }

        // Only the symptom text is compared; the drug list must match exactly.
        if let Some(entry) = cache
            .get_by_similarity_scoped(
                ANALYSIS_NAMESPACE,
                scope,
                run.text,
                self.settings.similarity_threshold,
                ttl,
            )
            .await
        {
            match serde_json::from_value::<RecommendationResult>(entry.payload) {
                Ok(hit) => {
                    debug!(
                        key = run.text,
                        scope,
                        matched_key = %entry.key,
                        score = entry.similarity_score.unwrap_or_default(),
                        "Analysis similarity cache hit"
                    );
                    self.metrics.record_similarity_cache_hit();
                    run.result = Some(hit.into_cache_hit());
                    run.from_cache = true;
                    return Ok(Stage::Done);
                }
                Err(e) => warn!(key = %entry.key, error = %e, "Similar cache entry has unexpected shape"),
            }
        }
        Ok(Stage::ExactMatch)
    }

    async fn exact_match(&self, run: &mut Run<'_>) -> Result<Stage, Error> {
        if run.text.is_empty() {
            return Ok(Stage::Generative);
        }
        let rows = match self
            .knowledge
            .find_symptoms(run.text, self.settings.symptom_search_limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(source = self.knowledge.name(), error = %e, "Exact symptom search failed");
                Vec::new()
            }
        };
        match self.prefer_curated(rows).await {
            Some(row) => {
                self.metrics.record_exact_match();
                run.matched = Some(row);
                run.provenance = Provenance::ExactMatch;
                Ok(Stage::Enrich)
            }
            None => Ok(Stage::FuzzyMatch),
        }
    }

    async fn fuzzy_match(&self, run: &mut Run<'_>) -> Result<Stage, Error> {
        for keyword in self.rules.symptom_keywords(run.text) {
            let rows = match self
                .knowledge
                .find_symptoms_by_keyword(&keyword, self.settings.symptom_search_limit)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(keyword = %keyword, error = %e, "Keyword symptom search failed");
                    continue;
                }
            };
            if let Some(row) = self.prefer_curated(rows).await {
                debug!(keyword = %keyword, symptom = row.display_name(), "Fuzzy symptom match");
                self.metrics.record_fuzzy_match();
                run.matched = Some(row);
                run.provenance = Provenance::FuzzyMatch;
                return Ok(Stage::Enrich);
            }
        }
        Ok(Stage::Generative)
    }

    /// First row with mapped remedies, else the first row.
    async fn prefer_curated(&self, rows: Vec<SymptomRow>) -> Option<SymptomRow> {
        for row in &rows {
            match self.knowledge.has_remedies(row.id).await {
                Ok(true) => return Some(row.clone()),
                Ok(false) => {}
                Err(e) => warn!(symptom_id = row.id, error = %e, "Remedy check failed"),
            }
        }
        rows.into_iter().next()
    }

    async fn enrich(&self, run: &mut Run<'_>) -> Result<Stage, Error> {
        let Some(row) = &run.matched else {
            return Err(Error::Pipeline("enrich reached without a matched symptom".into()));
        };

        let ingredients = self
            .knowledge
            .remedies_for(row.id, self.settings.max_kb_remedies)
            .await
            .unwrap_or_else(|e| {
                warn!(symptom_id = row.id, error = %e, "Remedy lookup failed");
                Vec::new()
            });
        if ingredients.is_empty() {
            info!(
                symptom = row.display_name(),
                "Matched symptom has no mapped remedies, falling back to generative"
            );
            return Ok(Stage::Generative);
        }

        let recipes = self
            .knowledge
            .recipes_for(row.id, self.settings.max_kb_recipes)
            .await
            .unwrap_or_else(|e| {
                warn!(symptom_id = row.id, error = %e, "Recipe lookup failed");
                Vec::new()
            });

        let name = row.display_name().to_string();
        let summary_text = match run.provenance {
            Provenance::ExactMatch => format!("Symptoms related to {name}."),
            _ => format!("Similar to '{name}'."),
        };
        run.result = Some(RecommendationResult {
            summary_text,
            confidence: run.provenance.default_confidence(),
            provenance: run.provenance,
            original_provenance: None,
            matched_symptom: Some(name),
            ingredients,
            recipes,
            cautions: Vec::new(),
        });
        Ok(Stage::InteractionCheck)
    }

    async fn generative(&self, run: &mut Run<'_>) -> Result<Stage, Error> {
        let prompt = generation_prompt(run.text, run.drugs);
        let plan = self
            .generator
            .generate(&prompt, PLAN_SCHEMA)
            .await
            .and_then(|value| self.parse_plan(value));

        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                self.metrics.record_generative(false);
                return Err(e.into());
            }
        };
        self.metrics.record_generative(true);

        let ingredients: Vec<Ingredient> = plan
            .ingredients
            .into_iter()
            .filter(|i| !i.name.trim().is_empty())
            .take(self.settings.max_generated_ingredients)
            .enumerate()
            .map(|(i, item)| Ingredient {
                code: format!("gen-{}", i + 1),
                display_name: item.name.trim().to_string(),
                rationale: item.rationale,
                polarity: Polarity::parse_loose(&item.polarity),
                priority: i as i32 + 1,
                evidence_level: GENERATED_EVIDENCE_LEVEL.into(),
            })
            .collect();
        let recipes: Vec<Recipe> = plan
            .recipes
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .take(self.settings.max_generated_recipes)
            .enumerate()
            .map(|(i, item)| Recipe {
                title: item.title.trim().to_string(),
                description: item.description,
                meal_slot: item.meal_slot.filter(|s| !s.trim().is_empty()),
                rationale: item.rationale,
                priority: i as i32 + 1,
                tags: Vec::new(),
            })
            .collect();

        let condition = plan.condition.trim().to_string();
        let summary_text = if !plan.summary.trim().is_empty() {
            plan.summary.trim().to_string()
        } else {
            format!("Symptoms consistent with {condition}.")
        };

        run.provenance = Provenance::Generative;
        run.result = Some(RecommendationResult {
            summary_text,
            confidence: Provenance::Generative.default_confidence(),
            provenance: Provenance::Generative,
            original_provenance: None,
            matched_symptom: Some(condition).filter(|c| !c.is_empty()),
            ingredients,
            recipes,
            cautions: Vec::new(),
        });
        Ok(Stage::InteractionCheck)
    }

    fn parse_plan(&self, value: serde_json::Value) -> Result<GeneratedPlan, SourceError> {
        let plan: GeneratedPlan =
            serde_json::from_value(value).map_err(|e| SourceError::Malformed {
                source_name: self.generator.name().to_string(),
                reason: e.to_string(),
            })?;
        if plan.summary.trim().is_empty()
            && plan.condition.trim().is_empty()
            && plan.ingredients.is_empty()
        {
            return Err(SourceError::Malformed {
                source_name: self.generator.name().to_string(),
                reason: "empty plan".into(),
            });
        }
        Ok(plan)
    }

    async fn interaction_check(&self, run: &mut Run<'_>) -> Result<Stage, Error> {
        let Some(result) = run.result.as_mut() else {
            return Err(Error::Pipeline("interaction check reached without a result".into()));
        };
        if run.drugs.is_empty() {
            return Ok(Stage::Done);
        }
        let foods: Vec<String> = result
            .ingredients
            .iter()
            .map(|i| i.display_name.clone())
            .collect();
        result.cautions = self.interactions.check_with_foods(run.drugs, &foods).await;
        Ok(Stage::Done)
    }

    async fn store(&self, scope: &str, result: &RecommendationResult, text: &str, drugs: &[String]) {
        let Some(cache) = &self.cache else {
            return;
        };
        let payload = match serde_json::to_value(result) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = text, error = %e, "Failed to serialize analysis");
                return;
            }
        };
        let metadata = serde_json::json!({
            "drugs": drugs,
            "provenance": result.provenance,
        });
        if let Err(e) = cache
            .set_scoped(ANALYSIS_NAMESPACE, scope, text, payload, Some(metadata))
            .await
        {
            warn!(key = text, error = %e, "Failed to cache analysis");
        }
    }
}

/// Cache scope for an analysis: the drug list, case-folded, sorted and
/// deduplicated. Results are only shared between identical drug sets.
pub fn analysis_scope(drugs: &[String]) -> String {
    let mut names: Vec<String> = drugs
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names.join(",")
}

fn generation_prompt(text: &str, drugs: &[String]) -> String {
    let mut prompt = String::from(
        "You are a clinical nutrition assistant. Infer the most likely underlying \
         condition from the information below and propose foods and simple dishes \
         that help with it. Mark foods that should be limited with polarity \
         \"caution\" or \"avoid\". Propose at most 5 ingredients and 3 recipes.\n",
    );
    if !text.is_empty() {
        prompt.push_str(&format!("Symptoms: {text}\n"));
    }
    if !drugs.is_empty() {
        prompt.push_str(&format!("Current medication: {}\n", drugs.join(", ")));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remedium_core::interaction::{Severity, SourceOrigin};
    use remedium_core::recommendation::Confidence;
    use remedium_core::source::{InteractionRegistry, InteractionRow};
    use remedium_core::{InteractionFact, KnowledgeError};
    use remedium_knowledge::InMemoryKnowledgeBase;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        answer: Result<serde_json::Value, SourceError>,
        call_count: Mutex<usize>,
    }

    impl ScriptedGenerator {
        fn ok(answer: serde_json::Value) -> Self {
            Self {
                answer: Ok(answer),
                call_count: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(SourceError::Network("connection reset".into())),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str, _schema: &str) -> Result<serde_json::Value, SourceError> {
            *self.call_count.lock().unwrap() += 1;
            self.answer.clone()
        }
    }

    struct NoRegistry;

    #[async_trait]
    impl InteractionRegistry for NoRegistry {
        fn name(&self) -> &str {
            "none"
        }

        fn is_configured(&self) -> bool {
            false
        }

        async fn lookup(&self, _drug: &str) -> Result<Vec<InteractionRow>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn plan() -> serde_json::Value {
        serde_json::json!({
            "summary": "Likely indigestion.",
            "condition": "소화불량",
            "ingredients": [
                {"name": "생강", "rationale": "warms the stomach", "polarity": "recommend"},
                {"name": "무", "rationale": "aids digestion", "polarity": "good"},
                {"name": "튀김", "rationale": "heavy on the stomach", "polarity": "avoid"},
                {"name": "매실", "rationale": "", "polarity": "recommend"},
                {"name": "양배추", "rationale": "", "polarity": "recommend"},
                {"name": "유자", "rationale": "", "polarity": "recommend"}
            ],
            "recipes": [{"title": "생강차", "meal_slot": "snack"}]
        })
    }

    fn symptom(id: i64, name: &str) -> SymptomRow {
        SymptomRow {
            id,
            name: name.into(),
            reading: String::new(),
            english_name: String::new(),
            aliases: vec![],
            category: String::new(),
            description: String::new(),
        }
    }

    fn food(code: &str, name: &str) -> Ingredient {
        Ingredient {
            code: code.into(),
            display_name: name.into(),
            rationale: "traditional use".into(),
            polarity: Polarity::Recommend,
            priority: 1,
            evidence_level: "traditional".into(),
        }
    }

    fn pipeline(kb: InMemoryKnowledgeBase, generator: Arc<ScriptedGenerator>) -> SymptomPipeline {
        let kb: Arc<dyn KnowledgeBase> = Arc::new(kb);
        let rules = Arc::new(RuleSet::default());
        let interactions = Arc::new(InteractionAggregator::new(
            kb.clone(),
            Arc::new(NoRegistry),
            rules.clone(),
        ));
        SymptomPipeline::new(kb, generator, interactions, rules)
    }

    #[tokio::test]
    async fn exact_match_prefers_curated_row() {
        let kb = InMemoryKnowledgeBase::new()
            .with_symptom(symptom(1, "불면"))
            .with_symptom(symptom(2, "불면증"))
            .with_remedy(2, food("F1", "대추"));
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = pipeline(kb, generator.clone());

        let resolution = p.run("불면", &[]).await;
        let result = resolution.result;
        assert_eq!(result.provenance, Provenance::ExactMatch);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.matched_symptom.as_deref(), Some("불면증"));
        assert_eq!(result.ingredients[0].display_name, "대추");
        assert_eq!(generator.calls(), 0);
        assert_eq!(
            resolution.path,
            vec![Stage::CacheCheck, Stage::ExactMatch, Stage::Enrich, Stage::InteractionCheck, Stage::Done]
        );
    }

    #[tokio::test]
    async fn fuzzy_match_through_synonyms() {
        let kb = InMemoryKnowledgeBase::new()
            .with_symptom(symptom(5, "소화불량"))
            .with_remedy(5, food("F2", "무"));
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = pipeline(kb, generator.clone());

        let result = p.resolve("속이 더부룩해요", &[]).await;
        assert_eq!(result.provenance, Provenance::FuzzyMatch);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.summary_text, "Similar to '소화불량'.");
        assert_eq!(generator.calls(), 0);
        assert_eq!(p.metrics().snapshot().fuzzy_matches, 1);
    }

    #[tokio::test]
    async fn match_without_remedies_falls_through_to_generative() {
        let kb = InMemoryKnowledgeBase::new().with_symptom(symptom(9, "두통"));
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = pipeline(kb, generator.clone());

        let resolution = p.run("두통", &[]).await;
        assert!(resolution.visited(Stage::Enrich));
        assert!(resolution.visited(Stage::Generative));
        assert_eq!(resolution.result.provenance, Provenance::Generative);
        assert!(!resolution.result.ingredients.is_empty());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn generated_output_is_capped_and_coded() {
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = pipeline(InMemoryKnowledgeBase::new(), generator);

        let result = p.resolve("속이 더부룩해요", &[]).await;
        assert_eq!(result.confidence, Confidence::General);
        assert_eq!(result.ingredients.len(), 5);
        assert_eq!(result.ingredients[0].code, "gen-1");
        assert_eq!(result.ingredients[0].evidence_level, "generated");
        assert_eq!(result.ingredients[2].polarity, Polarity::Avoid);
        assert_eq!(result.recipes[0].meal_slot.as_deref(), Some("snack"));
        assert_eq!(result.matched_symptom.as_deref(), Some("소화불량"));
    }

    #[tokio::test]
    async fn generative_failure_degrades() {
        let generator = Arc::new(ScriptedGenerator::failing());
        let p = pipeline(InMemoryKnowledgeBase::new(), generator);

        let resolution = p.run("알 수 없는 증상", &[]).await;
        assert!(resolution.result.is_error());
        assert_eq!(resolution.path.last(), Some(&Stage::Error));
        let snapshot = p.metrics().snapshot();
        assert_eq!(snapshot.generative_failures, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[tokio::test]
    async fn malformed_plan_degrades() {
        let generator = Arc::new(ScriptedGenerator::ok(serde_json::json!({"ingredients": "none"})));
        let p = pipeline(InMemoryKnowledgeBase::new(), generator);
        assert!(p.resolve("증상", &[]).await.is_error());

        let generator = Arc::new(ScriptedGenerator::ok(serde_json::json!({})));
        let p = pipeline(InMemoryKnowledgeBase::new(), generator);
        assert!(p.resolve("증상", &[]).await.is_error());
    }

    #[tokio::test]
    async fn empty_input_degrades_without_calls() {
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = pipeline(InMemoryKnowledgeBase::new(), generator.clone());
        assert!(p.resolve("   ", &[]).await.is_error());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn drugs_only_goes_straight_to_generative() {
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = pipeline(InMemoryKnowledgeBase::new(), generator.clone());
        let resolution = p.run("", &["Metformin".to_string()]).await;
        assert!(!resolution.visited(Stage::FuzzyMatch));
        assert_eq!(resolution.result.provenance, Provenance::Generative);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn cautions_cover_drug_food_pairs() {
        let kb = InMemoryKnowledgeBase::new()
            .with_symptom(symptom(5, "소화불량"))
            .with_remedy(5, food("F3", "자몽"))
            .with_interaction(InteractionFact::new(
                "Amlodipine",
                "자몽",
                Severity::Caution,
                "raises plasma levels",
                SourceOrigin::LocalKb,
            ));
        let p = pipeline(kb, Arc::new(ScriptedGenerator::ok(plan())));

        let result = p.resolve("소화불량", &["Amlodipine".to_string()]).await;
        assert_eq!(result.cautions.len(), 1);
        assert_eq!(result.cautions[0].ref_b, "자몽");
    }

    #[tokio::test]
    async fn results_are_cached_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = pipeline(InMemoryKnowledgeBase::new(), generator.clone()).with_cache(cache.clone());

        let first = p.resolve("속이 더부룩해요", &[]).await;
        let second = p.resolve("속이 더부룩해요", &[]).await;
        assert_eq!(generator.calls(), 1);
        assert_eq!(second.provenance, Provenance::Cache);
        assert_eq!(second.confidence, first.confidence);
        assert_eq!(second.effective_provenance(), Provenance::Generative);
        assert_eq!(p.metrics().snapshot().exact_cache_hits, 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path()).unwrap();
        let generator = Arc::new(ScriptedGenerator::failing());
        let p = pipeline(InMemoryKnowledgeBase::new(), generator.clone()).with_cache(cache.clone());

        p.resolve("증상", &[]).await;
        p.resolve("증상", &[]).await;
        assert_eq!(generator.calls(), 2);
        assert!(!cache.exists_scoped(ANALYSIS_NAMESPACE, &analysis_scope(&[]), "증상").await);
    }

    #[tokio::test]
    async fn knowledge_failures_are_absorbed() {
        struct DownKnowledgeBase;

        #[async_trait]
        impl KnowledgeBase for DownKnowledgeBase {
            fn name(&self) -> &str {
                "down"
            }
            async fn find_symptoms(&self, _: &str, _: usize) -> Result<Vec<SymptomRow>, KnowledgeError> {
                Err(KnowledgeError::QueryFailed("connection refused".into()))
            }
            async fn find_symptoms_by_keyword(&self, _: &str, _: usize) -> Result<Vec<SymptomRow>, KnowledgeError> {
                Err(KnowledgeError::QueryFailed("connection refused".into()))
            }
            async fn has_remedies(&self, _: i64) -> Result<bool, KnowledgeError> {
                Ok(false)
            }
            async fn remedies_for(&self, _: i64, _: usize) -> Result<Vec<Ingredient>, KnowledgeError> {
                Ok(vec![])
            }
            async fn recipes_for(&self, _: i64, _: usize) -> Result<Vec<Recipe>, KnowledgeError> {
                Ok(vec![])
            }
            async fn traditional_prescriptions_for(
                &self,
                _: i64,
                _: usize,
            ) -> Result<Vec<remedium_core::TraditionalPrescription>, KnowledgeError> {
                Ok(vec![])
            }
            async fn interactions_matching(&self, _: &str) -> Result<Vec<InteractionFact>, KnowledgeError> {
                Ok(vec![])
            }
            async fn find_drugs(
                &self,
                _: &str,
                _: usize,
            ) -> Result<Vec<remedium_core::CatalogDrug>, KnowledgeError> {
                Ok(vec![])
            }
        }

        let kb: Arc<dyn KnowledgeBase> = Arc::new(DownKnowledgeBase);
        let rules = Arc::new(RuleSet::default());
        let interactions = Arc::new(InteractionAggregator::new(kb.clone(), Arc::new(NoRegistry), rules.clone()));
        let generator = Arc::new(ScriptedGenerator::ok(plan()));
        let p = SymptomPipeline::new(kb, generator.clone(), interactions, rules);

        let result = p.resolve("두통", &[]).await;
        assert_eq!(result.provenance, Provenance::Generative);
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn scope_ignores_order_case_and_blanks() {
        let a = analysis_scope(&["Warfarin".into(), " aspirin ".into()]);
        let b = analysis_scope(&["ASPIRIN".into(), "warfarin".into(), "".into()]);
        assert_eq!(a, "aspirin,warfarin");
        assert_eq!(a, b);
        assert_eq!(analysis_scope(&[]), "");
        assert_ne!(analysis_scope(&["Warfarin".into()]), analysis_scope(&[]));
    }

    #[test]
    fn prompt_mentions_inputs() {
        let prompt = generation_prompt("두통", &["Aspirin".into()]);
        assert!(prompt.contains("Symptoms: 두통"));
        assert!(prompt.contains("Current medication: Aspirin"));
        assert!(!generation_prompt("", &[]).contains("Symptoms:"));
    }
}
