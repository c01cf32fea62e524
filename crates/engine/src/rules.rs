//! Rule tables: severity keywords, symptom synonyms, dosage-form suffixes,
//! drug-name extraction and lifestyle advice.
//!
//! Everything here is driven by [`RulesConfig`] so the tables can be tuned
//! without touching the pipeline, and tested without any network.

use regex_lite::Regex;
use std::sync::LazyLock;
use remedium_config::RulesConfig;
use remedium_core::interaction::Severity;

/// Compiled view of the configured rule tables.
#[derive(Debug, Clone)]
pub struct RuleSet {
    config: RulesConfig,
    /// Longest suffix first so `필름코팅정` wins over `정`.
    suffixes: Vec<String>,
    strength: Option<Regex>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(RulesConfig::default())
    }
}

impl RuleSet {
    pub fn new(config: RulesConfig) -> Self {
        let mut suffixes = config.dosage_form_suffixes.clone();
        suffixes.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));

        let mut units = config.dosage_units.clone();
        units.sort_by_key(|u| std::cmp::Reverse(u.chars().count()));
        let alternation = units
            .iter()
            .map(|u| regex_lite::escape(u))
            .collect::<Vec<_>>()
            .join("|");
        let strength = if alternation.is_empty() {
            None
        } else {
            Regex::new(&format!(r"(?i)^(.*?)\s*\d+(?:\.\d+)?\s*(?:{alternation})$")).ok()
        };

        Self {
            config,
            suffixes,
            strength,
        }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Severity for an interaction rationale. The first keyword found wins;
    /// no keyword means the configured default.
    pub fn classify_severity(&self, reason: &str) -> Severity {
        let lowered = reason.to_lowercase();
        self.config
            .severity_keywords
            .iter()
            .find(|rule| lowered.contains(&rule.keyword.to_lowercase()))
            .map(|rule| rule.severity)
            .unwrap_or(self.config.default_severity)
    }

    /// The name with a trailing dosage-form suffix removed, if any.
    pub fn strip_dosage_form<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.suffixes.iter().find_map(|suffix| {
            name.strip_suffix(suffix.as_str())
                .map(str::trim_end)
                .filter(|rest| !rest.is_empty())
        })
    }

    /// The name with a trailing strength (`500mg`, `10 밀리그램`) removed.
    pub fn strip_strength<'a>(&self, name: &'a str) -> Option<&'a str> {
        let caps = self.strength.as_ref()?.captures(name)?;
        caps.get(1).map(|m| m.as_str().trim()).filter(|s| !s.is_empty())
    }

    /// Search variants of a drug name: as given, without strength, without
    /// dosage-form suffix. Deduplicated, original first.
    pub fn name_variants(&self, name: &str) -> Vec<String> {
        let name = name.trim();
        let mut variants = vec![name.to_string()];
        let base = self.strip_strength(name).unwrap_or(name);
        for candidate in [Some(base), self.strip_dosage_form(base)].into_iter().flatten() {
            if !candidate.is_empty() && !variants.iter().any(|v| v == candidate) {
                variants.push(candidate.to_string());
            }
        }
        variants
    }

    /// Rule-based drug-name extraction over free text lines.
    ///
    /// A token counts as a drug name when it carries a dosage-form suffix
    /// (and is at least three characters long) or a strength such as
    /// `500mg`. Strength is dropped from the returned name.
    pub fn extract_drug_names<S: AsRef<str>>(&self, lines: &[S]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for line in lines {
            for token in line.as_ref().split(|c: char| c.is_whitespace() || c == ',') {
                let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '.');
                if token.is_empty() || token.chars().all(|c| c.is_ascii_digit() || c == '.') {
                    continue;
                }
                let candidate = match self.strip_strength(token) {
                    Some(name) => Some(name),
                    None if token.chars().count() >= 3 && self.strip_dosage_form(token).is_some() => {
                        Some(token)
                    }
                    None => None,
                };
                if let Some(name) = candidate {
                    if !name.chars().any(char::is_alphabetic) {
                        continue;
                    }
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names
    }

    /// Strip one trailing particle from a token.
    fn strip_particle<'a>(&self, token: &'a str) -> &'a str {
        self.config
            .token_particles
            .iter()
            .find_map(|p| token.strip_suffix(p.as_str()))
            .unwrap_or(token)
    }

    /// Keywords for fuzzy symptom matching: synonym-table hits first, then
    /// raw tokens (particle removed, at least two characters).
    pub fn symptom_keywords(&self, text: &str) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        let mut push = |k: &str| {
            if !keywords.iter().any(|existing| existing == k) {
                keywords.push(k.to_string());
            }
        };

        for rule in &self.config.symptom_synonyms {
            if rule.patterns.iter().any(|p| text.contains(p.as_str())) {
                push(&rule.keyword);
            }
        }
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            let token = self.strip_particle(token);
            if token.chars().count() >= 2 {
                push(token);
            }
        }
        keywords
    }

    /// Whitespace tokens longer than one character, as typed.
    pub fn symptom_tokens(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|t| t.chars().count() > 1)
            .map(str::to_string)
            .collect()
    }

    /// Advice for the first matching keyword, else the default advice.
    pub fn lifestyle_advice(&self, text: &str) -> &str {
        self.config
            .lifestyle_advice
            .iter()
            .find(|rule| text.contains(rule.keyword.as_str()))
            .map(|rule| rule.advice.as_str())
            .unwrap_or(self.config.default_advice.as_str())
    }
}

static HTML_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

/// Strip HTML tags, decode the common entities and collapse whitespace.
pub fn clean_html(text: &str) -> String {
    let without_tags = match HTML_TAG.as_ref() {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
