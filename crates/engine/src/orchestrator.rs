//! Analysis orchestrator: prescription reading, interaction and evidence
//! lookup, symptom resolution, then one report.
//!
//! [`AnalysisService::analyze_stream`] runs the same four stages in a
//! background task and reports each stage start as a [`ProgressEvent`],
//! ending with exactly one `result` or `error` event.

use remedium_config::AppConfig;
use remedium_core::error::Error;
use remedium_core::event::ProgressEvent;
use remedium_core::evidence::{Citation, EvidenceRecord, EvidenceTier, TrustLevel};
use remedium_core::interaction::InteractionFact;
use remedium_core::recommendation::{Polarity, Provenance, RecommendationResult};
use remedium_core::source::{TextInput, TextSource, TraditionalSearchResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::evidence::EvidenceTierResolver;
use crate::interaction::{InteractionAggregator, format_warnings};
use crate::pipeline::SymptomPipeline;
use crate::rules::RuleSet;
use crate::traditional::{TraditionalLookup, TraditionalMedicine};

pub const NO_INTERACTION_NOTICE: &str = "No known interactions between the listed drugs.";
pub const CONSULT_NOTICE: &str =
    "Consult your doctor or pharmacist before changing your medication or diet.";
const INTERACTION_NOTE: &str = "Check the interaction warnings above before adding these foods.";
const NEUTRAL_PRECAUTION: &str = "Fine in normal amounts; there is no need to eat more than usual.";
const CAUTION_PRECAUTION: &str = "Limit or avoid this food while the symptoms last.";

/// What to analyse. At least one of symptom text, drugs or a prescription
/// must be present.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub symptom_text: Option<String>,
    pub drugs: Vec<String>,
    pub prescription: Option<TextInput>,
}

impl AnalysisRequest {
    pub fn symptom(text: impl Into<String>) -> Self {
        Self {
            symptom_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_drugs(mut self, drugs: Vec<String>) -> Self {
        self.drugs = drugs;
        self
    }

    pub fn with_prescription(mut self, input: TextInput) -> Self {
        self.prescription = Some(input);
        self
    }

    fn symptom_text(&self) -> &str {
        self.symptom_text.as_deref().map(str::trim).unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.symptom_text().is_empty() && self.drugs.is_empty() && self.prescription.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionSummary {
    pub drugs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Rendered interaction warnings, or a single "nothing found" notice.
    pub warnings: Vec<String>,
    pub interactions: Vec<InteractionFact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicEvidence {
    pub summary: String,
    pub trust_level: TrustLevel,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifestyleGuide {
    pub tokens: Vec<String>,
    pub advice: String,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodAdvice {
    pub name: String,
    pub rationale: String,
    pub polarity: Polarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precaution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub prescription_summary: PrescriptionSummary,
    pub drug_details: Vec<EvidenceRecord>,
    pub academic_evidence: AcademicEvidence,
    pub lifestyle_guide: LifestyleGuide,
    pub remedies: Vec<FoodAdvice>,
    /// Empty lists when nothing traditional was found or no lookup is wired.
    pub traditional_medicine: TraditionalMedicine,
    pub recommendation: RecommendationResult,
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub max_evidence_subjects: usize,
    pub max_report_foods: usize,
    pub max_citations: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ReportSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_evidence_subjects: config.pipeline.max_evidence_subjects,
            max_report_foods: config.pipeline.max_report_foods,
            max_citations: config.web.max_citations,
        }
    }
}

/// Numbered stages of one analysis, as reported to streaming callers.
const STAGES: [(u8, &str, u8); 4] = [
    (1, "Reading prescription", 10),
    (2, "Checking interactions and drug information", 35),
    (3, "Analysing symptoms", 65),
    (4, "Building report", 90),
];

/// Everything gathered before the report is assembled.
struct Findings {
    drugs: Vec<String>,
    issuer: Option<String>,
    interactions: Vec<InteractionFact>,
    drug_details: Vec<EvidenceRecord>,
    traditional: TraditionalMedicine,
}

#[derive(Clone)]
pub struct AnalysisService {
    text_source: Arc<dyn TextSource>,
    interactions: Arc<InteractionAggregator>,
    evidence: Arc<EvidenceTierResolver>,
    pipeline: Arc<SymptomPipeline>,
    rules: Arc<RuleSet>,
    traditional: Option<Arc<TraditionalLookup>>,
    settings: ReportSettings,
}

impl AnalysisService {
    pub fn new(
        text_source: Arc<dyn TextSource>,
        interactions: Arc<InteractionAggregator>,
        evidence: Arc<EvidenceTierResolver>,
        pipeline: Arc<SymptomPipeline>,
        rules: Arc<RuleSet>,
    ) -> Self {
        Self {
            text_source,
            interactions,
            evidence,
            pipeline,
            rules,
            traditional: None,
            settings: ReportSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ReportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_traditional(mut self, lookup: TraditionalLookup) -> Self {
        self.traditional = Some(Arc::new(lookup));
        self
    }

    pub fn pipeline(&self) -> &Arc<SymptomPipeline> {
        &self.pipeline
    }

    pub fn interactions(&self) -> &Arc<InteractionAggregator> {
        &self.interactions
    }

    pub fn evidence(&self) -> &Arc<EvidenceTierResolver> {
        &self.evidence
    }

    /// Run every stage and build the report.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, Error> {
        self.run(request, None).await
    }

    /// Streaming variant of [`analyze`](Self::analyze).
    ///
    /// Progress events arrive in stage order; the stream then yields one
    /// `result` event carrying the serialized report, or one `error` event.
    pub fn analyze_stream(&self, request: AnalysisRequest) -> ReceiverStream<ProgressEvent> {
        let (tx, rx) = mpsc::channel::<ProgressEvent>(128);
        let service = self.clone();

        tokio::spawn(async move {
            let terminal = match service.run(request, Some(&tx)).await {
                Ok(report) => match serde_json::to_value(&report) {
                    Ok(data) => ProgressEvent::Result { data },
                    Err(e) => ProgressEvent::Error {
                        message: format!("Failed to serialize report: {e}"),
                    },
                },
                Err(e) => ProgressEvent::Error {
                    message: e.to_string(),
                },
            };
            let _ = tx.send(terminal).await;
        });

        ReceiverStream::new(rx)
    }

    async fn run(
        &self,
        request: AnalysisRequest,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<AnalysisReport, Error> {
        if request.is_empty() {
            return Err(Error::Pipeline(
                "nothing to analyse: no symptom text, drugs or prescription".into(),
            ));
        }
        let symptom_text = request.symptom_text().to_string();

        // 1. prescription
        emit(progress, 0).await;
        let mut drugs = distinct(&request.drugs);
        let mut issuer = None;
        if let Some(input) = request.prescription {
            let extraction = self.text_source.extract(input).await;
            let names = if extraction.drug_names.is_empty() {
                self.rules.extract_drug_names(&extraction.lines)
            } else {
                extraction.drug_names
            };
            debug!(
                source = self.text_source.name(),
                lines = extraction.lines.len(),
                drugs = names.len(),
                "Prescription read"
            );
            for name in names {
                if !drugs.contains(&name) {
                    drugs.push(name);
                }
            }
            issuer = extraction.issuer;
        }

        // 2. interactions and drug evidence, concurrently with the traditional registry
        emit(progress, 1).await;
        let subjects: Vec<String> = drugs
            .iter()
            .take(self.settings.max_evidence_subjects)
            .cloned()
            .collect();
        let (interactions, drug_details, registry_formulas) = tokio::join!(
            self.interactions.check_interactions(&drugs),
            self.evidence.resolve_bulk(&subjects),
            self.registry_formulas(&drugs)
        );

        // 3. symptoms
        emit(progress, 2).await;
        let recommendation = if symptom_text.is_empty() && drugs.is_empty() {
            warn!("Prescription yielded no drugs and no symptom text was given");
            RecommendationResult::degraded()
        } else {
            self.pipeline.resolve(&symptom_text, &drugs).await
        };

        // 4. report
        emit(progress, 3).await;
        let curated = match (&self.traditional, recommendation.matched_symptom.as_deref()) {
            (Some(lookup), Some(symptom)) => lookup.for_symptom(symptom).await,
            _ => Vec::new(),
        };
        let findings = Findings {
            drugs,
            issuer,
            interactions,
            drug_details,
            traditional: TraditionalMedicine::merge(curated, registry_formulas),
        };
        let report = self.build_report(&symptom_text, findings, recommendation);
        info!(
            drugs = report.prescription_summary.drugs.len(),
            interactions = report.prescription_summary.interactions.len(),
            trust_level = %report.academic_evidence.trust_level,
            foods = report.remedies.len(),
            traditional = report.traditional_medicine.prescriptions.len(),
            "Analysis report built"
        );
        Ok(report)
    }

    async fn registry_formulas(&self, drugs: &[String]) -> Option<TraditionalSearchResult> {
        match &self.traditional {
            Some(lookup) => lookup.for_drugs(drugs).await,
            None => None,
        }
    }

    fn build_report(
        &self,
        symptom_text: &str,
        findings: Findings,
        recommendation: RecommendationResult,
    ) -> AnalysisReport {
        let Findings {
            drugs,
            issuer,
            interactions,
            drug_details,
            traditional,
        } = findings;
        let warnings = if interactions.is_empty() {
            vec![NO_INTERACTION_NOTICE.to_string()]
        } else {
            format_warnings(&interactions)
        };

        let academic_evidence = self.academic_evidence(&drug_details, &recommendation);
        let lifestyle_guide = self.lifestyle_guide(symptom_text, &recommendation);
        let remedies = self.remedies(&recommendation);

        AnalysisReport {
            prescription_summary: PrescriptionSummary {
                drugs,
                issuer,
                warnings,
                interactions,
            },
            drug_details,
            academic_evidence,
            lifestyle_guide,
            remedies,
            traditional_medicine: traditional,
            recommendation,
        }
    }

    fn academic_evidence(
        &self,
        records: &[EvidenceRecord],
        recommendation: &RecommendationResult,
    ) -> AcademicEvidence {
        let trust_level = overall_trust_level(records, recommendation);

        let mut citations: Vec<Citation> = Vec::new();
        for citation in records.iter().flat_map(|r| r.citations.iter()) {
            if citations.len() >= self.settings.max_citations {
                break;
            }
            if !citations.iter().any(|c| c.url == citation.url) {
                citations.push(citation.clone());
            }
        }

        let summary = if records.is_empty() {
            match recommendation.effective_provenance() {
                Provenance::ExactMatch | Provenance::FuzzyMatch => {
                    "Recommendation drawn from the curated knowledge base.".to_string()
                }
                _ => "Recommendation generated by a language model; treat it as general guidance."
                    .to_string(),
            }
        } else {
            let resolved = records.iter().filter(|r| r.is_resolved()).count();
            format!(
                "Evidence found for {resolved} of {} drugs (trust level {trust_level}).",
                records.len()
            )
        };

        AcademicEvidence {
            summary,
            trust_level,
            citations,
        }
    }

    fn lifestyle_guide(&self, symptom_text: &str, recommendation: &RecommendationResult) -> LifestyleGuide {
        let focus = recommendation
            .matched_symptom
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(symptom_text);
        let tokens = self.rules.symptom_tokens(focus);
        let advice = self.rules.lifestyle_advice(&format!("{focus} {symptom_text}")).to_string();

        let mut notes: Vec<String> = recommendation
            .recipes
            .iter()
            .map(|r| match &r.meal_slot {
                Some(slot) => format!("Try {} ({slot}).", r.title),
                None => format!("Try {}.", r.title),
            })
            .collect();
        if !recommendation.cautions.is_empty() {
            notes.push(INTERACTION_NOTE.to_string());
        }
        if notes.is_empty() {
            notes.push(self.rules.config().default_advice.clone());
        }
        notes.push(CONSULT_NOTICE.to_string());

        LifestyleGuide {
            tokens,
            advice,
            notes,
        }
    }

    fn remedies(&self, recommendation: &RecommendationResult) -> Vec<FoodAdvice> {
        recommendation
            .ingredients
            .iter()
            .take(self.settings.max_report_foods)
            .map(|ingredient| {
                let interaction = recommendation
                    .cautions
                    .iter()
                    .find(|fact| fact.mentions(&ingredient.display_name));
                let precaution = match (interaction, ingredient.polarity) {
                    (Some(fact), _) => Some(fact.render_warning()),
                    (None, Polarity::Recommend) => None,
                    (None, Polarity::Neutral) => Some(NEUTRAL_PRECAUTION.to_string()),
                    (None, Polarity::Caution | Polarity::Avoid) => Some(CAUTION_PRECAUTION.to_string()),
                };
                FoodAdvice {
                    name: ingredient.display_name.clone(),
                    rationale: ingredient.rationale.clone(),
                    polarity: ingredient.polarity,
                    precaution,
                }
            })
            .collect()
    }
}

async fn emit(progress: Option<&mpsc::Sender<ProgressEvent>>, index: usize) {
    let (stage, message, percent) = STAGES[index];
    debug!(stage, message, "Analysis stage");
    if let Some(tx) = progress {
        let _ = tx.send(ProgressEvent::progress(stage, message, percent)).await;
    }
}

/// A if any drug has an authoritative record, B if any has literature,
/// C if any has web evidence; otherwise graded by how the recommendation
/// was produced.
pub fn overall_trust_level(records: &[EvidenceRecord], recommendation: &RecommendationResult) -> TrustLevel {
    let has = |tier: EvidenceTier| records.iter().any(|r| r.tier == tier);
    if has(EvidenceTier::Authoritative) {
        TrustLevel::A
    } else if has(EvidenceTier::Literature) {
        TrustLevel::B
    } else if has(EvidenceTier::Web) {
        TrustLevel::C
    } else {
        match recommendation.effective_provenance() {
            Provenance::ExactMatch => TrustLevel::A,
            Provenance::FuzzyMatch => TrustLevel::B,
            _ => TrustLevel::C,
        }
    }
}

fn distinct(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !out.iter().any(|existing| existing == name) {
            out.push(name.to_string());
        }
    }
    out
}
