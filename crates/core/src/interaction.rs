//! Interaction facts between two drugs, or a drug and a food.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Contraindicated,
    Caution,
}

impl Severity {
    /// Icon used when rendering warnings for people.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Contraindicated => "🚫",
            Self::Caution => "⚠️",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceOrigin {
    LocalKb,
    ExternalRegistry,
}

/// An unordered, case-folded pair of references.
///
/// `PairKey::new("A", "B") == PairKey::new("b", "a")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

/// One interaction between `ref_a` and `ref_b`.
///
/// Two facts with the same unordered pair are the same fact, whichever side
/// each reference sits on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionFact {
    pub ref_a: String,
    pub ref_b: String,
    pub severity: Severity,
    pub rationale: String,
    pub source_origin: SourceOrigin,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_a: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient_b: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_date: Option<String>,
}

impl InteractionFact {
    pub fn new(
        ref_a: impl Into<String>,
        ref_b: impl Into<String>,
        severity: Severity,
        rationale: impl Into<String>,
        source_origin: SourceOrigin,
    ) -> Self {
        Self {
            ref_a: ref_a.into(),
            ref_b: ref_b.into(),
            severity,
            rationale: rationale.into(),
            source_origin,
            ingredient_a: None,
            ingredient_b: None,
            notice_date: None,
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.ref_a, &self.ref_b)
    }

    /// Whether `name` loosely matches either side (case-insensitive
    /// containment in either direction).
    pub fn mentions(&self, name: &str) -> bool {
        loosely_matches(&self.ref_a, name) || loosely_matches(&self.ref_b, name)
    }

    /// Human-readable warning line, e.g.
    /// `⚠️ [DUR] 'Aspirin' + 'Warfarin' — bleeding risk (ingredients: x / y)`.
    pub fn render_warning(&self) -> String {
        let reason = if self.rationale.trim().is_empty() {
            "use together with caution"
        } else {
            self.rationale.trim()
        };
        let mut line = format!(
            "{} [DUR] '{}' + '{}' — {}",
            self.severity.icon(),
            self.ref_a,
            self.ref_b,
            reason
        );
        if let (Some(a), Some(b)) = (&self.ingredient_a, &self.ingredient_b) {
            if !a.is_empty() && !b.is_empty() {
                line.push_str(&format!(" (ingredients: {a} / {b})"));
            }
        }
        line
    }
}

/// Case-insensitive containment in either direction. Empty strings never match.
pub fn loosely_matches(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_unordered_and_case_folded() {
        assert_eq!(PairKey::new("Aspirin", "Warfarin"), PairKey::new("warfarin", "ASPIRIN"));
        assert_ne!(PairKey::new("Aspirin", "Warfarin"), PairKey::new("Aspirin", "Ibuprofen"));
    }

    #[test]
    fn mentions_matches_substrings_both_ways() {
        let fact = InteractionFact::new(
            "Amlodipine",
            "그레이프프루트",
            Severity::Caution,
            "raises plasma levels",
            SourceOrigin::LocalKb,
        );
        assert!(fact.mentions("amlodipine"));
        assert!(fact.mentions("Amlodipine Besylate 5mg"));
        assert!(fact.mentions("그레이프프루트"));
        assert!(!fact.mentions("Metformin"));
        assert!(!fact.mentions(""));
    }

    #[test]
    fn render_warning_uses_severity_icon() {
        let mut fact = InteractionFact::new(
            "A",
            "B",
            Severity::Contraindicated,
            "병용금기",
            SourceOrigin::ExternalRegistry,
        );
        fact.ingredient_a = Some("x".into());
        fact.ingredient_b = Some("y".into());
        let line = fact.render_warning();
        assert!(line.starts_with("🚫"));
        assert!(line.contains("'A' + 'B'"));
        assert!(line.contains("(ingredients: x / y)"));
    }

    #[test]
    fn render_warning_defaults_empty_reason() {
        let fact = InteractionFact::new("A", "B", Severity::Caution, " ", SourceOrigin::LocalKb);
        assert!(fact.render_warning().contains("use together with caution"));
    }
}
