//! In-memory knowledge base, loaded from a JSON seed or built in code.

use async_trait::async_trait;
use remedium_core::error::KnowledgeError;
use remedium_core::interaction::{InteractionFact, SourceOrigin};
use remedium_core::knowledge::{CatalogDrug, KnowledgeBase, SymptomRow};
use remedium_core::recommendation::{Ingredient, Polarity, Recipe};
use remedium_core::source::TraditionalPrescription;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::seed::KnowledgeSeed;

/// A knowledge base held entirely in memory.
///
/// Rows keep insertion order; every search returns them in that order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKnowledgeBase {
    symptoms: Vec<SymptomRow>,
    remedies: HashMap<i64, Vec<Ingredient>>,
    recipes: HashMap<i64, Vec<Recipe>>,
    traditional: HashMap<i64, Vec<TraditionalPrescription>>,
    interactions: Vec<InteractionFact>,
    drugs: Vec<CatalogDrug>,
}

const LOCAL_SOURCE: &str = "local_kb";

fn contains_ci(field: &str, term_lower: &str) -> bool {
    field.to_lowercase().contains(term_lower)
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a parsed seed, resolving food codes to display names.
    pub fn from_seed(seed: KnowledgeSeed) -> Self {
        let food_names: HashMap<String, String> = seed
            .foods
            .into_iter()
            .map(|f| (f.code, f.name))
            .collect();

        let mut kb = Self::new();
        for symptom in seed.symptoms {
            kb = kb.with_symptom(symptom);
        }
        for remedy in seed.remedies {
            let display_name = food_names
                .get(&remedy.food_code)
                .cloned()
                .unwrap_or_else(|| remedy.food_code.clone());
            kb = kb.with_remedy(
                remedy.symptom_id,
                Ingredient {
                    code: remedy.food_code,
                    display_name,
                    rationale: remedy.rationale,
                    polarity: Polarity::parse_loose(&remedy.polarity),
                    priority: remedy.priority,
                    evidence_level: remedy.evidence_level,
                },
            );
        }
        for recipe in seed.recipes {
            kb = kb.with_recipe(recipe.symptom_id, recipe.recipe);
        }
        for row in seed.traditional_prescriptions {
            let mut prescription = row.prescription;
            if prescription.source.is_empty() {
                prescription.source = LOCAL_SOURCE.into();
            }
            kb = kb.with_traditional_prescription(row.symptom_id, prescription);
        }
        for fact in seed.interactions {
            kb = kb.with_interaction(InteractionFact::new(
                fact.ref_a,
                fact.ref_b,
                fact.severity,
                fact.rationale,
                SourceOrigin::LocalKb,
            ));
        }
        for drug in seed.drugs {
            kb = kb.with_drug(drug);
        }
        kb
    }

    /// Load a JSON seed file.
    pub fn from_json_file(path: &Path) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KnowledgeError::Load(format!("{}: {e}", path.display())))?;
        let seed: KnowledgeSeed = serde_json::from_str(&content)
            .map_err(|e| KnowledgeError::Load(format!("{}: {e}", path.display())))?;
        let kb = Self::from_seed(seed);
        debug!(
            path = %path.display(),
            symptoms = kb.symptoms.len(),
            interactions = kb.interactions.len(),
            drugs = kb.drugs.len(),
            "Knowledge base seed loaded"
        );
        Ok(kb)
    }

    pub fn with_symptom(mut self, symptom: SymptomRow) -> Self {
        self.symptoms.push(symptom);
        self
    }

    pub fn with_remedy(mut self, symptom_id: i64, ingredient: Ingredient) -> Self {
        self.remedies.entry(symptom_id).or_default().push(ingredient);
        self
    }

    pub fn with_recipe(mut self, symptom_id: i64, recipe: Recipe) -> Self {
        self.recipes.entry(symptom_id).or_default().push(recipe);
        self
    }

    pub fn with_traditional_prescription(
        mut self,
        symptom_id: i64,
        prescription: TraditionalPrescription,
    ) -> Self {
        self.traditional.entry(symptom_id).or_default().push(prescription);
        self
    }

    pub fn with_interaction(mut self, fact: InteractionFact) -> Self {
        self.interactions.push(fact);
        self
    }

    pub fn with_drug(mut self, drug: CatalogDrug) -> Self {
        self.drugs.push(drug);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty() && self.interactions.is_empty() && self.drugs.is_empty()
    }

    fn search_symptoms(
        &self,
        term: &str,
        limit: usize,
        include_aliases: bool,
    ) -> Vec<SymptomRow> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Vec::new();
        }
        self.symptoms
            .iter()
            .filter(|s| {
                contains_ci(&s.name, &term)
                    || contains_ci(&s.reading, &term)
                    || contains_ci(&s.english_name, &term)
                    || (include_aliases
                        && (s.aliases.iter().any(|a| contains_ci(a, &term))
                            || contains_ci(&s.category, &term)))
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn find_symptoms(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<SymptomRow>, KnowledgeError> {
        Ok(self.search_symptoms(term, limit, false))
    }

    async fn find_symptoms_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SymptomRow>, KnowledgeError> {
        Ok(self.search_symptoms(keyword, limit, true))
    }

    async fn has_remedies(&self, symptom_id: i64) -> Result<bool, KnowledgeError> {
        Ok(self
            .remedies
            .get(&symptom_id)
            .is_some_and(|r| !r.is_empty()))
    }

    async fn remedies_for(
        &self,
        symptom_id: i64,
        limit: usize,
    ) -> Result<Vec<Ingredient>, KnowledgeError> {
        let mut remedies = self.remedies.get(&symptom_id).cloned().unwrap_or_default();
        remedies.sort_by_key(|r| r.priority);
        remedies.truncate(limit);
        Ok(remedies)
    }

    async fn recipes_for(
        &self,
        symptom_id: i64,
        limit: usize,
    ) -> Result<Vec<Recipe>, KnowledgeError> {
        let mut recipes = self.recipes.get(&symptom_id).cloned().unwrap_or_default();
        recipes.sort_by_key(|r| r.priority);
        recipes.truncate(limit);
        Ok(recipes)
    }

    async fn traditional_prescriptions_for(
        &self,
        symptom_id: i64,
        limit: usize,
    ) -> Result<Vec<TraditionalPrescription>, KnowledgeError> {
        Ok(self
            .traditional
            .get(&symptom_id)
            .map(|rows| rows.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn interactions_matching(
        &self,
        name: &str,
    ) -> Result<Vec<InteractionFact>, KnowledgeError> {
        Ok(self
            .interactions
            .iter()
            .filter(|f| f.mentions(name))
            .cloned()
            .collect())
    }

    async fn find_drugs(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<CatalogDrug>, KnowledgeError> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .drugs
            .iter()
            .filter(|d| contains_ci(&d.name_ko, &term) || contains_ci(&d.name_en, &term))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedium_core::interaction::Severity;
    use std::io::Write;

    fn symptom(id: i64, name: &str, aliases: &[&str]) -> SymptomRow {
        SymptomRow {
            id,
            name: name.into(),
            reading: String::new(),
            english_name: String::new(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            category: "소화기".into(),
            description: String::new(),
        }
    }

    fn ingredient(code: &str, priority: i32) -> Ingredient {
        Ingredient {
            code: code.into(),
            display_name: code.into(),
            rationale: String::new(),
            polarity: Polarity::Recommend,
            priority,
            evidence_level: "traditional".into(),
        }
    }

    #[tokio::test]
    async fn name_search_ignores_aliases() {
        let kb = InMemoryKnowledgeBase::new().with_symptom(symptom(1, "소화불량", &["더부룩함"]));
        assert_eq!(kb.find_symptoms("소화", 10).await.unwrap().len(), 1);
        assert!(kb.find_symptoms("더부룩", 10).await.unwrap().is_empty());
        assert_eq!(kb.find_symptoms_by_keyword("더부룩", 10).await.unwrap().len(), 1);
        assert_eq!(kb.find_symptoms_by_keyword("소화기", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_term_matches_nothing() {
        let kb = InMemoryKnowledgeBase::new().with_symptom(symptom(1, "두통", &[]));
        assert!(kb.find_symptoms("  ", 10).await.unwrap().is_empty());
        assert!(kb.find_drugs("", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remedies_are_sorted_and_limited() {
        let kb = InMemoryKnowledgeBase::new()
            .with_symptom(symptom(1, "소화불량", &[]))
            .with_remedy(1, ingredient("C", 30))
            .with_remedy(1, ingredient("A", 10))
            .with_remedy(1, ingredient("B", 20))
            .with_remedy(1, ingredient("D", 40));

        let remedies = kb.remedies_for(1, 3).await.unwrap();
        let codes: Vec<_> = remedies.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
        assert!(kb.has_remedies(1).await.unwrap());
        assert!(!kb.has_remedies(2).await.unwrap());
    }

    #[tokio::test]
    async fn interactions_match_loosely() {
        let kb = InMemoryKnowledgeBase::new().with_interaction(InteractionFact::new(
            "Amlodipine",
            "그레이프프루트",
            Severity::Caution,
            "raises plasma levels",
            SourceOrigin::LocalKb,
        ));
        assert_eq!(kb.interactions_matching("amlodipine 5mg").await.unwrap().len(), 1);
        assert_eq!(kb.interactions_matching("그레이프프루트").await.unwrap().len(), 1);
        assert!(kb.interactions_matching("Metformin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loads_json_seed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "symptoms": [{{"id": 7, "name": "소화불량", "aliases": ["더부룩함"]}}],
                "foods": [{{"code": "F001", "name": "생강"}}],
                "remedies": [{{"symptom_id": 7, "food_code": "F001", "rationale": "위를 따뜻하게", "polarity": "good", "priority": 1}}],
                "recipes": [{{"symptom_id": 7, "title": "생강차", "meal_slot": "snack"}}],
                "traditional_prescriptions": [{{"symptom_id": 7, "code": "P0412", "name": "반하사심탕", "ingredients": "반하, 황금, 건강"}}],
                "interactions": [{{"ref_a": "Amlodipine", "ref_b": "자몽", "severity": "CONTRAINDICATED"}}],
                "drugs": [{{"id": 3, "name_ko": "타이레놀", "name_en": "Tylenol"}}]
            }}"#
        )
        .unwrap();

        let kb = InMemoryKnowledgeBase::from_json_file(file.path()).unwrap();
        let remedies = kb.remedies_for(7, 3).await.unwrap();
        assert_eq!(remedies[0].display_name, "생강");
        assert_eq!(remedies[0].polarity, Polarity::Recommend);

        let recipes = kb.recipes_for(7, 3).await.unwrap();
        assert_eq!(recipes[0].title, "생강차");
        assert_eq!(recipes[0].priority, 100);

        let formulas = kb.traditional_prescriptions_for(7, 3).await.unwrap();
        assert_eq!(formulas[0].name, "반하사심탕");
        assert_eq!(formulas[0].source, "local_kb");
        assert!(kb.traditional_prescriptions_for(8, 3).await.unwrap().is_empty());

        let facts = kb.interactions_matching("자몽").await.unwrap();
        assert_eq!(facts[0].severity, Severity::Contraindicated);
        assert_eq!(facts[0].source_origin, SourceOrigin::LocalKb);

        assert_eq!(kb.find_drugs("tylenol", 5).await.unwrap()[0].id, 3);
    }

    #[tokio::test]
    async fn traditional_prescriptions_keep_order_and_limit() {
        let formula = |code: &str| TraditionalPrescription {
            code: code.into(),
            name: format!("처방 {code}"),
            ingredients: String::new(),
            source: "KOREANTK".into(),
        };
        let kb = InMemoryKnowledgeBase::new()
            .with_traditional_prescription(1, formula("P2"))
            .with_traditional_prescription(1, formula("P1"))
            .with_traditional_prescription(1, formula("P3"));

        let rows = kb.traditional_prescriptions_for(1, 2).await.unwrap();
        let codes: Vec<_> = rows.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["P2", "P1"]);
        assert_eq!(rows[0].source, "KOREANTK");
    }

    #[test]
    fn missing_seed_is_a_load_error() {
        let err = InMemoryKnowledgeBase::from_json_file(Path::new("/nonexistent/seed.json"))
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Load(_)));
    }

    #[test]
    fn unknown_food_code_falls_back_to_code() {
        let seed: KnowledgeSeed = serde_json::from_str(
            r#"{"remedies": [{"symptom_id": 1, "food_code": "X9"}]}"#,
        )
        .unwrap();
        let kb = InMemoryKnowledgeBase::from_seed(seed);
        assert_eq!(kb.remedies[&1][0].display_name, "X9");
    }
}
