//! Knowledge base trait: the curated local store of symptoms, remedies,
//! recipes, traditional prescriptions, catalog drugs and interaction facts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;
use crate::interaction::InteractionFact;
use crate::recommendation::{Ingredient, Recipe};
use crate::source::TraditionalPrescription;

/// A curated symptom / condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomRow {
    pub id: i64,
    /// Modern display name, e.g. `소화불량`.
    pub name: String,
    /// Traditional reading of the condition name.
    #[serde(default)]
    pub reading: String,
    #[serde(default)]
    pub english_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

impl SymptomRow {
    /// The best name to show a person.
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.reading.is_empty() {
            &self.reading
        } else {
            &self.english_name
        }
    }
}

/// A drug from the local catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDrug {
    pub id: i64,
    pub name_ko: String,
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

/// Read access to the curated knowledge base.
///
/// All text matching is case-insensitive substring matching ("field contains
/// term"). Rows come back in storage order; callers pick among them.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    fn name(&self) -> &str;

    /// Symptoms whose name, reading or English name contains `term`.
    async fn find_symptoms(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<SymptomRow>, KnowledgeError>;

    /// Like [`find_symptoms`](Self::find_symptoms) but also searches aliases
    /// and the category.
    async fn find_symptoms_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SymptomRow>, KnowledgeError>;

    /// Whether at least one remedy is mapped to the symptom.
    async fn has_remedies(&self, symptom_id: i64) -> Result<bool, KnowledgeError>;

    /// Remedies mapped to the symptom, ordered by ascending priority.
    async fn remedies_for(
        &self,
        symptom_id: i64,
        limit: usize,
    ) -> Result<Vec<Ingredient>, KnowledgeError>;

    async fn recipes_for(
        &self,
        symptom_id: i64,
        limit: usize,
    ) -> Result<Vec<Recipe>, KnowledgeError>;

    /// Traditional prescriptions curated for the symptom, in storage order.
    async fn traditional_prescriptions_for(
        &self,
        symptom_id: i64,
        limit: usize,
    ) -> Result<Vec<TraditionalPrescription>, KnowledgeError>;

    /// Interaction facts where either side loosely matches `name`.
    async fn interactions_matching(
        &self,
        name: &str,
    ) -> Result<Vec<InteractionFact>, KnowledgeError>;

    /// Catalog drugs whose Korean or English name contains `term`.
    async fn find_drugs(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<CatalogDrug>, KnowledgeError>;
}
