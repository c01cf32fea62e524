//! Step-wise analysis over an explicit session store.
//!
//! 1. [`StepwiseAnalysis::extract`] opens a session and proposes keywords.
//! 2. [`StepwiseAnalysis::search`] turns confirmed keywords into candidate
//!    symptoms and catalog drugs.
//! 3. [`StepwiseAnalysis::report`] runs the symptom pipeline on the
//!    selection and shapes a report.

use async_trait::async_trait;
use remedium_core::error::{Error, SessionError};
use remedium_core::knowledge::{CatalogDrug, KnowledgeBase, SymptomRow};
use remedium_core::recommendation::{Confidence, Provenance};
use remedium_core::session::{SearchKind, Session, SessionId, SessionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::pipeline::SymptomPipeline;
use crate::rules::RuleSet;

const SYMPTOM_KEYWORD_CONFIDENCE: f32 = 1.0;
const DRUG_KEYWORD_CONFIDENCE: f32 = 0.9;

/// Process-local session storage.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, session: Session) -> Result<(), SessionError> {
        self.sessions.write().await.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, SessionError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedKeyword {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub session_id: SessionId,
    pub keywords: Vec<DetectedKeyword>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidates {
    pub symptoms: Vec<SymptomRow>,
    pub drugs: Vec<CatalogDrug>,
}

/// What the person picked from the candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub drugs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepwiseReport {
    pub summary: String,
    /// Rendered interaction warnings for the selected drugs and foods.
    pub medication_guide: Vec<String>,
    pub recommended_foods: Vec<FoodItem>,
    pub avoid_foods: Vec<FoodItem>,
    pub lifestyle_advice: String,
    pub provenance: Provenance,
    pub confidence: Confidence,
}

pub struct StepwiseAnalysis {
    store: Arc<dyn SessionStore>,
    knowledge: Arc<dyn KnowledgeBase>,
    pipeline: Arc<SymptomPipeline>,
    rules: Arc<RuleSet>,
    candidate_limit: usize,
}

impl StepwiseAnalysis {
    pub fn new(
        store: Arc<dyn SessionStore>,
        knowledge: Arc<dyn KnowledgeBase>,
        pipeline: Arc<SymptomPipeline>,
        rules: Arc<RuleSet>,
    ) -> Self {
        Self {
            store,
            knowledge,
            pipeline,
            rules,
            candidate_limit: 5,
        }
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Step 1: open a session and propose keywords from `text`.
    pub async fn extract(&self, kind: SearchKind, text: &str) -> Result<Extraction, Error> {
        let (keywords, confidence) = match kind {
            SearchKind::Symptom => (self.rules.symptom_tokens(text), SYMPTOM_KEYWORD_CONFIDENCE),
            SearchKind::Prescription => (
                self.rules.extract_drug_names(&text.lines().collect::<Vec<_>>()),
                DRUG_KEYWORD_CONFIDENCE,
            ),
        };

        let session = Session::new(kind, text, keywords.clone());
        let session_id = session.id.clone();
        self.store.put(session).await?;
        info!(session = %session_id, kind = ?kind, keywords = keywords.len(), "Session opened");

        Ok(Extraction {
            session_id,
            keywords: keywords
                .into_iter()
                .map(|text| DetectedKeyword { text, confidence })
                .collect(),
        })
    }

    /// Step 2: candidates for the confirmed keywords. The confirmed set
    /// replaces the session's keywords.
    pub async fn search(&self, id: &SessionId, confirmed: &[String]) -> Result<Candidates, Error> {
        let mut session = self.session(id).await?;
        let keywords: Vec<String> = confirmed
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        let mut symptoms: Vec<SymptomRow> = Vec::new();
        let mut drugs: Vec<CatalogDrug> = Vec::new();
        for keyword in &keywords {
            match self.knowledge.find_symptoms_by_keyword(keyword, self.candidate_limit).await {
                Ok(rows) => {
                    for row in rows {
                        if !symptoms.iter().any(|s| s.id == row.id) {
                            symptoms.push(row);
                        }
                    }
                }
                Err(e) => warn!(keyword = %keyword, error = %e, "Candidate symptom search failed"),
            }
            match self.knowledge.find_drugs(keyword, self.candidate_limit).await {
                Ok(rows) => {
                    for row in rows {
                        if !drugs.iter().any(|d| d.id == row.id) {
                            drugs.push(row);
                        }
                    }
                }
                Err(e) => warn!(keyword = %keyword, error = %e, "Candidate drug search failed"),
            }
        }

        session.keywords = keywords;
        self.store.put(session).await?;
        debug!(session = %id, symptoms = symptoms.len(), drugs = drugs.len(), "Candidates found");
        Ok(Candidates { symptoms, drugs })
    }

    /// Step 3: resolve the selection. With nothing selected, the session
    /// keywords stand in for symptoms or drugs depending on the session kind.
    pub async fn report(&self, id: &SessionId, selection: &Selection) -> Result<StepwiseReport, Error> {
        let session = self.session(id).await?;

        let mut symptoms = selection.symptoms.clone();
        let mut drugs = selection.drugs.clone();
        if symptoms.is_empty() && drugs.is_empty() {
            match session.kind {
                SearchKind::Symptom => symptoms = session.keywords.clone(),
                SearchKind::Prescription => drugs = session.keywords.clone(),
            }
        }
        let text = symptoms.join(" ");

        let result = self.pipeline.resolve(&text, &drugs).await;
        let (recommended, avoid): (Vec<_>, Vec<_>) = result
            .ingredients
            .iter()
            .partition(|i| i.polarity.is_favourable());
        let food = |i: &&remedium_core::recommendation::Ingredient| FoodItem {
            name: i.display_name.clone(),
            rationale: i.rationale.clone(),
        };

        let focus = result.matched_symptom.clone().unwrap_or_else(|| text.clone());
        Ok(StepwiseReport {
            summary: result.summary_text.clone(),
            medication_guide: result.cautions.iter().map(|c| c.render_warning()).collect(),
            recommended_foods: recommended.iter().map(food).collect(),
            avoid_foods: avoid.iter().map(food).collect(),
            lifestyle_advice: self.rules.lifestyle_advice(&format!("{focus} {text}")).to_string(),
            provenance: result.provenance,
            confidence: result.confidence,
        })
    }

    /// Drop a session once its report has been delivered.
    pub async fn close(&self, id: &SessionId) -> Result<bool, Error> {
        Ok(self.store.remove(id).await?)
    }

    async fn session(&self, id: &SessionId) -> Result<Session, Error> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionAggregator;
    use remedium_core::error::SourceError;
    use remedium_core::interaction::{InteractionFact, Severity, SourceOrigin};
    use remedium_core::recommendation::{Ingredient, Polarity};
    use remedium_core::source::{GenerativeClient, InteractionRegistry, InteractionRow};
    use remedium_knowledge::InMemoryKnowledgeBase;

    struct Unused;

    #[async_trait]
    impl GenerativeClient for Unused {
        fn name(&self) -> &str {
            "unused"
        }
        async fn generate(&self, _: &str, _: &str) -> Result<serde_json::Value, SourceError> {
            Err(SourceError::NotConfigured("unused".into()))
        }
    }

    #[async_trait]
    impl InteractionRegistry for Unused {
        fn name(&self) -> &str {
            "unused"
        }
        fn is_configured(&self) -> bool {
            false
        }
        async fn lookup(&self, _: &str) -> Result<Vec<InteractionRow>, SourceError> {
            Ok(vec![])
        }
    }

    fn symptom(id: i64, name: &str, aliases: &[&str]) -> SymptomRow {
        SymptomRow {
            id,
            name: name.into(),
            reading: String::new(),
            english_name: String::new(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            category: String::new(),
            description: String::new(),
        }
    }

    fn food(code: &str, name: &str, polarity: Polarity) -> Ingredient {
        Ingredient {
            code: code.into(),
            display_name: name.into(),
            rationale: "traditional use".into(),
            polarity,
            priority: 1,
            evidence_level: "traditional".into(),
        }
    }

    fn analysis() -> (StepwiseAnalysis, Arc<InMemorySessionStore>) {
        let kb: Arc<dyn KnowledgeBase> = Arc::new(
            InMemoryKnowledgeBase::new()
                .with_symptom(symptom(1, "불면", &["잠"]))
                .with_symptom(symptom(2, "불면증", &[]))
                .with_remedy(1, food("F1", "대추", Polarity::Recommend))
                .with_remedy(1, food("F2", "커피", Polarity::Avoid))
                .with_drug(CatalogDrug {
                    id: 10,
                    name_ko: "졸피뎀정".into(),
                    name_en: "Zolpidem".into(),
                    manufacturer: String::new(),
                    description: String::new(),
                    category: String::new(),
                })
                .with_interaction(InteractionFact::new(
                    "Zolpidem",
                    "커피",
                    Severity::Caution,
                    "caffeine counteracts sedation",
                    SourceOrigin::LocalKb,
                )),
        );
        let rules = Arc::new(RuleSet::default());
        let interactions = Arc::new(InteractionAggregator::new(kb.clone(), Arc::new(Unused), rules.clone()));
        let pipeline = Arc::new(SymptomPipeline::new(kb.clone(), Arc::new(Unused), interactions, rules.clone()));
        let store = Arc::new(InMemorySessionStore::new());
        (StepwiseAnalysis::new(store.clone(), kb, pipeline, rules), store)
    }

    #[tokio::test]
    async fn store_put_get_remove() {
        let store = InMemorySessionStore::new();
        let session = Session::new(SearchKind::Symptom, "두통", vec!["두통".into()]);
        let id = session.id.clone();
        store.put(session).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().unwrap().raw_text, "두통");
        assert!(store.remove(&id).await.unwrap());
        assert!(!store.remove(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extract_symptom_keywords() {
        let (analysis, store) = analysis();
        let extraction = analysis.extract(SearchKind::Symptom, "불면 이 심해요").await.unwrap();
        let texts: Vec<&str> = extraction.keywords.iter().map(|k| k.text.as_str()).collect();
        assert_eq!(texts, vec!["불면", "심해요"]);
        assert!(extraction.keywords.iter().all(|k| k.confidence == 1.0));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn extract_prescription_keywords() {
        let (analysis, _) = analysis();
        let extraction = analysis
            .extract(SearchKind::Prescription, "서울의원\n졸피뎀정 10mg 취침 전")
            .await
            .unwrap();
        assert_eq!(extraction.keywords.len(), 1);
        assert_eq!(extraction.keywords[0].text, "졸피뎀정");
        assert_eq!(extraction.keywords[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn search_dedupes_candidates_and_updates_keywords() {
        let (analysis, store) = analysis();
        let id = analysis.extract(SearchKind::Symptom, "잠 불면").await.unwrap().session_id;

        let candidates = analysis
            .search(&id, &["불면".to_string(), "잠".to_string(), "Zolpidem".to_string()])
            .await
            .unwrap();
        let ids: Vec<i64> = candidates.symptoms.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(candidates.drugs.len(), 1);

        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.keywords, vec!["불면", "잠", "Zolpidem"]);
    }

    #[tokio::test]
    async fn report_splits_foods_and_guides_medication() {
        let (analysis, _) = analysis();
        let id = analysis.extract(SearchKind::Symptom, "불면").await.unwrap().session_id;
        let selection = Selection {
            symptoms: vec!["불면".into()],
            drugs: vec!["Zolpidem".into()],
        };

        let report = analysis.report(&id, &selection).await.unwrap();
        assert_eq!(report.provenance, Provenance::ExactMatch);
        assert_eq!(report.recommended_foods[0].name, "대추");
        assert_eq!(report.avoid_foods[0].name, "커피");
        assert_eq!(report.medication_guide.len(), 1);
        assert!(report.lifestyle_advice.contains("screens"));
    }

    #[tokio::test]
    async fn report_falls_back_to_session_keywords() {
        let (analysis, _) = analysis();
        let id = analysis.extract(SearchKind::Symptom, "불면").await.unwrap().session_id;
        let report = analysis.report(&id, &Selection::default()).await.unwrap();
        assert_eq!(report.confidence, Confidence::High);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (analysis, _) = analysis();
        let err = analysis.search(&SessionId::new(), &[]).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NotFound(_))));

        let err = analysis.report(&SessionId::new(), &Selection::default()).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn closed_session_is_gone() {
        let (analysis, _) = analysis();
        let id = analysis.extract(SearchKind::Symptom, "불면").await.unwrap().session_id;
        assert!(analysis.close(&id).await.unwrap());
        assert!(analysis.search(&id, &[]).await.is_err());
    }
}
