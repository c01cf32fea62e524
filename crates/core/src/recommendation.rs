//! Symptom-to-remedy recommendations.

use crate::interaction::InteractionFact;
use serde::{Deserialize, Serialize};

/// How much a recommendation can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    General,
    Error,
}

/// Which resolution state produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    ExactMatch,
    FuzzyMatch,
    Generative,
    Cache,
}

impl Provenance {
    /// Confidence implied by reaching this state.
    ///
    /// `Cache` has no intrinsic confidence; a cache hit keeps the stored one.
    pub fn default_confidence(self) -> Confidence {
        match self {
            Self::ExactMatch => Confidence::High,
            Self::FuzzyMatch => Confidence::Medium,
            Self::Generative | Self::Cache => Confidence::General,
        }
    }
}

/// Whether a food is recommended or should be avoided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    Recommend,
    Neutral,
    Caution,
    Avoid,
}

impl Polarity {
    /// Parse the loose vocabulary used by curated data and model output
    /// (`recommend`, `good`, `neutral`, `caution`, `avoid`).
    pub fn parse_loose(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "avoid" => Self::Avoid,
            "caution" => Self::Caution,
            "neutral" => Self::Neutral,
            _ => Self::Recommend,
        }
    }

    pub fn is_favourable(self) -> bool {
        matches!(self, Self::Recommend | Self::Neutral)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Knowledge-base food code; generated ingredients get a synthetic one.
    pub code: String,
    pub display_name: String,
    pub rationale: String,
    pub polarity: Polarity,
    /// Lower sorts first.
    pub priority: i32,
    /// e.g. `traditional`, `clinical`, `empirical`, `generated`.
    pub evidence_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// breakfast / lunch / dinner / snack, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_slot: Option<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default = "default_recipe_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_recipe_priority() -> i32 {
    100
}

/// The answer of one symptom resolution call.
///
/// Never mutated after creation; the cache stores a serialized copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub summary_text: String,
    pub confidence: Confidence,
    pub provenance: Provenance,

    /// For `Provenance::Cache`, the state that originally produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_provenance: Option<Provenance>,

    /// Name of the knowledge-base symptom that matched, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_symptom: Option<String>,

    #[serde(default)]
    pub ingredients: Vec<Ingredient>,

    #[serde(default)]
    pub recipes: Vec<Recipe>,

    #[serde(default)]
    pub cautions: Vec<InteractionFact>,
}

/// Summary shown when the pipeline could not produce anything usable.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, we could not analyse these symptoms right now. Please try again later \
     or consult a doctor or pharmacist.";

impl RecommendationResult {
    /// The safe degraded result returned in the ERROR state.
    pub fn degraded() -> Self {
        Self {
            summary_text: APOLOGY_MESSAGE.into(),
            confidence: Confidence::Error,
            provenance: Provenance::Generative,
            original_provenance: None,
            matched_symptom: None,
            ingredients: Vec::new(),
            recipes: Vec::new(),
            cautions: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.confidence == Confidence::Error
    }

    /// The state that produced the content, looking through cache hits.
    pub fn effective_provenance(&self) -> Provenance {
        match self.provenance {
            Provenance::Cache => self.original_provenance.unwrap_or(Provenance::Cache),
            other => other,
        }
    }

    /// Re-tag a stored result as served from cache, keeping its confidence.
    pub fn into_cache_hit(mut self) -> Self {
        if self.provenance != Provenance::Cache {
            self.original_provenance = Some(self.provenance);
        }
        self.provenance = Provenance::Cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(provenance: Provenance) -> RecommendationResult {
        RecommendationResult {
            summary_text: "indigestion".into(),
            confidence: provenance.default_confidence(),
            provenance,
            original_provenance: None,
            matched_symptom: None,
            ingredients: vec![],
            recipes: vec![],
            cautions: vec![],
        }
    }

    #[test]
    fn confidence_follows_provenance() {
        assert_eq!(Provenance::ExactMatch.default_confidence(), Confidence::High);
        assert_eq!(Provenance::FuzzyMatch.default_confidence(), Confidence::Medium);
        assert_eq!(Provenance::Generative.default_confidence(), Confidence::General);
    }

    #[test]
    fn cache_hit_keeps_confidence_and_origin() {
        let hit = sample(Provenance::ExactMatch).into_cache_hit();
        assert_eq!(hit.provenance, Provenance::Cache);
        assert_eq!(hit.confidence, Confidence::High);
        assert_eq!(hit.original_provenance, Some(Provenance::ExactMatch));
        assert_eq!(hit.effective_provenance(), Provenance::ExactMatch);

        // Re-tagging twice does not lose the origin.
        let again = hit.into_cache_hit();
        assert_eq!(again.original_provenance, Some(Provenance::ExactMatch));
    }

    #[test]
    fn degraded_result_is_error() {
        let result = RecommendationResult::degraded();
        assert!(result.is_error());
        assert!(result.ingredients.is_empty());
        assert_eq!(result.summary_text, APOLOGY_MESSAGE);
    }

    #[test]
    fn polarity_parses_loose_vocabulary() {
        assert_eq!(Polarity::parse_loose("good"), Polarity::Recommend);
        assert_eq!(Polarity::parse_loose("AVOID"), Polarity::Avoid);
        assert_eq!(Polarity::parse_loose("caution"), Polarity::Caution);
        assert_eq!(Polarity::parse_loose("neutral"), Polarity::Neutral);
        assert!(Polarity::Neutral.is_favourable());
        assert!(!Polarity::Avoid.is_favourable());
    }

    #[test]
    fn result_roundtrips_through_json() {
        let result = sample(Provenance::FuzzyMatch);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["provenance"], "FUZZY_MATCH");
        let parsed: RecommendationResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, result);
    }
}
