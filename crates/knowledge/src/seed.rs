//! JSON seed format for the knowledge base.
//!
//! ```json
//! {
//!   "symptoms":     [{"id": 1, "name": "소화불량", "aliases": ["더부룩함"]}],
//!   "foods":        [{"code": "F001", "name": "생강"}],
//!   "remedies":     [{"symptom_id": 1, "food_code": "F001", "rationale": "...", "polarity": "recommend", "priority": 1}],
//!   "recipes":      [{"symptom_id": 1, "title": "생강차"}],
//!   "traditional_prescriptions": [{"symptom_id": 1, "code": "P0123", "name": "반하사심탕", "ingredients": "반하, 황금"}],
//!   "interactions": [{"ref_a": "Amlodipine", "ref_b": "자몽", "severity": "CAUTION", "rationale": "..."}],
//!   "drugs":        [{"id": 1, "name_ko": "타이레놀", "name_en": "Tylenol"}]
//! }
//! ```
//!
//! Every section is optional.

use remedium_core::interaction::Severity;
use remedium_core::knowledge::{CatalogDrug, SymptomRow};
use remedium_core::recommendation::Recipe;
use remedium_core::source::TraditionalPrescription;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeSeed {
    #[serde(default)]
    pub symptoms: Vec<SymptomRow>,

    #[serde(default)]
    pub foods: Vec<FoodSeed>,

    #[serde(default)]
    pub remedies: Vec<RemedySeed>,

    #[serde(default)]
    pub recipes: Vec<RecipeSeed>,

    #[serde(default)]
    pub traditional_prescriptions: Vec<TraditionalSeed>,

    #[serde(default)]
    pub interactions: Vec<InteractionSeed>,

    #[serde(default)]
    pub drugs: Vec<CatalogDrug>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodSeed {
    pub code: String,
    pub name: String,
}

/// A food mapped to a symptom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemedySeed {
    pub symptom_id: i64,
    pub food_code: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default = "default_polarity")]
    pub polarity: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_evidence_level")]
    pub evidence_level: String,
}

fn default_polarity() -> String {
    "recommend".into()
}
fn default_priority() -> i32 {
    100
}
fn default_evidence_level() -> String {
    "traditional".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSeed {
    pub symptom_id: i64,
    #[serde(flatten)]
    pub recipe: Recipe,
}

/// A traditional prescription curated for a symptom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraditionalSeed {
    pub symptom_id: i64,
    #[serde(flatten)]
    pub prescription: TraditionalPrescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionSeed {
    pub ref_a: String,
    pub ref_b: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub rationale: String,
}

fn default_severity() -> Severity {
    Severity::Caution
}
