//! Configuration loading, validation, and management for remedium.
//!
//! Loads configuration from `~/.remedium/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The `rules` section holds the heuristic lookup tables (severity keywords,
//! symptom synonyms, dosage-form suffixes). They are data, not logic: override
//! them in the config file to tune matching without touching code.

use remedium_core::interaction::Severity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.remedium/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache store settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Local knowledge base
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// External evidence sources
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Web tier search settings
    #[serde(default)]
    pub web: WebConfig,

    /// Generative model fallback chain
    #[serde(default)]
    pub generative: GenerativeConfig,

    /// Result size limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Heuristic rule tables
    #[serde(default)]
    pub rules: RulesConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// --- Cache ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory. Defaults to `~/.remedium/cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Minimum Jaccard score for a similarity-cache hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Number of lock stripes serialising access to cache files.
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,

    #[serde(default)]
    pub ttl: CacheTtlConfig,
}

fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_lock_stripes() -> usize {
    64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            similarity_threshold: default_similarity_threshold(),
            lock_stripes: default_lock_stripes(),
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Resolved cache directory.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("cache"))
    }
}

/// Time-to-live per cache namespace, in hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    #[serde(default = "default_ttl_day")]
    pub analysis_hours: u64,

    #[serde(default = "default_ttl_week")]
    pub label_hours: u64,

    #[serde(default = "default_ttl_week")]
    pub literature_hours: u64,

    #[serde(default = "default_ttl_day")]
    pub web_hours: u64,

    #[serde(default = "default_ttl_week")]
    pub registry_hours: u64,

    #[serde(default = "default_ttl_day")]
    pub traditional_hours: u64,
}

fn default_ttl_day() -> u64 {
    24
}
fn default_ttl_week() -> u64 {
    168
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            analysis_hours: default_ttl_day(),
            label_hours: default_ttl_week(),
            literature_hours: default_ttl_week(),
            web_hours: default_ttl_day(),
            registry_hours: default_ttl_week(),
            traditional_hours: default_ttl_day(),
        }
    }
}

impl CacheTtlConfig {
    fn all(&self) -> [(&'static str, u64); 6] {
        [
            ("analysis_hours", self.analysis_hours),
            ("label_hours", self.label_hours),
            ("literature_hours", self.literature_hours),
            ("web_hours", self.web_hours),
            ("registry_hours", self.registry_hours),
            ("traditional_hours", self.traditional_hours),
        ]
    }
}

// --- Knowledge base ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// JSON seed file. Without one the knowledge base starts empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_path: Option<PathBuf>,
}

// --- External sources ---

#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub api_url: String,

    pub timeout_secs: u64,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SourceConfig {
    fn new(api_url: &str, timeout_secs: u64) -> Self {
        Self {
            api_key: None,
            api_url: api_url.into(),
            timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Government drug label registry.
    #[serde(default = "default_label_source")]
    pub label: SourceConfig,

    /// Drug-drug interaction registry.
    #[serde(default = "default_interaction_source")]
    pub interactions: SourceConfig,

    /// Literature search (E-utilities).
    #[serde(default = "default_literature_source")]
    pub literature: SourceConfig,

    /// Web search.
    #[serde(default = "default_web_source")]
    pub web: SourceConfig,

    /// Translation for cross-language literature search.
    #[serde(default = "default_translation_source")]
    pub translation: SourceConfig,

    /// Traditional prescription and Korean-medicine paper registry.
    #[serde(default = "default_traditional_source")]
    pub traditional: SourceConfig,
}

fn default_label_source() -> SourceConfig {
    SourceConfig::new(
        "https://apis.data.go.kr/1471000/DrbEasyDrugInfoService/getDrbEasyDrugList",
        10,
    )
}
fn default_interaction_source() -> SourceConfig {
    SourceConfig::new(
        "https://api.odcloud.kr/api/15089525/v1/uddi:3f2efdac-942b-494e-919f-8bdc583f65ea",
        10,
    )
}
fn default_literature_source() -> SourceConfig {
    SourceConfig::new("https://eutils.ncbi.nlm.nih.gov/entrez/eutils", 10)
}
fn default_web_source() -> SourceConfig {
    SourceConfig::new("https://api.tavily.com/search", 15)
}
fn default_translation_source() -> SourceConfig {
    SourceConfig::new(
        "https://translation.googleapis.com/language/translate/v2",
        5,
    )
}

fn default_traditional_source() -> SourceConfig {
    SourceConfig::new(
        "https://apis.data.go.kr/1430000/SimPreInfoService/getSimPreSearch",
        10,
    )
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            label: default_label_source(),
            interactions: default_interaction_source(),
            literature: default_literature_source(),
            web: default_web_source(),
            translation: default_translation_source(),
            traditional: default_traditional_source(),
        }
    }
}

impl SourcesConfig {
    fn all(&self) -> [(&'static str, &SourceConfig); 6] {
        [
            ("label", &self.label),
            ("interactions", &self.interactions),
            ("literature", &self.literature),
            ("web", &self.web),
            ("translation", &self.translation),
            ("traditional", &self.traditional),
        ]
    }
}

// --- Web tier ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Only hits from these domains are used as evidence.
    #[serde(default = "default_trusted_domains")]
    pub trusted_domains: Vec<String>,

    #[serde(default = "default_web_max_results")]
    pub max_results: usize,

    /// Each hit's content is truncated to this many characters.
    #[serde(default = "default_web_content_chars")]
    pub content_chars: usize,

    /// Efficacy summaries built from web content are truncated to this.
    #[serde(default = "default_web_summary_chars")]
    pub summary_chars: usize,

    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
}

fn default_trusted_domains() -> Vec<String> {
    [
        "health.kr",
        "drug.mfds.go.kr",
        "nedrug.mfds.go.kr",
        "nhs.uk",
        "drugs.com",
        "webmd.com",
        "medlineplus.gov",
        "rxlist.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}
fn default_web_max_results() -> usize {
    5
}
fn default_web_content_chars() -> usize {
    500
}
fn default_web_summary_chars() -> usize {
    200
}
fn default_max_citations() -> usize {
    3
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            trusted_domains: default_trusted_domains(),
            max_results: default_web_max_results(),
            content_chars: default_web_content_chars(),
            summary_chars: default_web_summary_chars(),
            max_citations: default_max_citations(),
        }
    }
}

// --- Generative chain ---

#[derive(Clone, Serialize, Deserialize)]
pub struct GenerativeConfig {
    /// Shared API key for chain entries without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Summarise literature hits with the generative chain.
    #[serde(default = "default_true")]
    pub summarize_literature: bool,

    /// Endpoints tried in order until one answers.
    #[serde(default = "default_chain")]
    pub chain: Vec<GenerativeEndpoint>,
}

fn default_temperature() -> f32 {
    0.3
}
fn default_chain() -> Vec<GenerativeEndpoint> {
    vec![
        GenerativeEndpoint {
            name: "primary".into(),
            api_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            timeout_secs: 30,
        },
        GenerativeEndpoint {
            name: "secondary".into(),
            api_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            api_key: None,
            timeout_secs: 45,
        },
    ]
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            temperature: default_temperature(),
            summarize_literature: true,
            chain: default_chain(),
        }
    }
}

impl std::fmt::Debug for GenerativeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeConfig")
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("summarize_literature", &self.summarize_literature)
            .field("chain", &self.chain)
            .finish()
    }
}

/// One OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct GenerativeEndpoint {
    pub name: String,

    pub api_url: String,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_generative_timeout")]
    pub timeout_secs: u64,
}

fn default_generative_timeout() -> u64 {
    30
}

impl std::fmt::Debug for GenerativeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeEndpoint")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// --- Pipeline limits ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Drugs given a detail section in a report.
    #[serde(default = "default_three")]
    pub max_evidence_subjects: usize,

    #[serde(default = "default_three")]
    pub max_kb_remedies: usize,

    #[serde(default = "default_three")]
    pub max_kb_recipes: usize,

    #[serde(default = "default_five")]
    pub max_generated_ingredients: usize,

    #[serde(default = "default_three")]
    pub max_generated_recipes: usize,

    #[serde(default = "default_five")]
    pub max_report_foods: usize,

    #[serde(default = "default_three")]
    pub max_papers: usize,

    /// Traditional prescriptions and papers per report section.
    #[serde(default = "default_three")]
    pub max_traditional_rows: usize,

    /// Rows fetched per knowledge-base symptom query.
    #[serde(default = "default_symptom_search_limit")]
    pub symptom_search_limit: usize,

    /// Candidates per keyword in step-wise search.
    #[serde(default = "default_five")]
    pub candidate_limit: usize,
}

fn default_three() -> usize {
    3
}
fn default_five() -> usize {
    5
}
fn default_symptom_search_limit() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_evidence_subjects: 3,
            max_kb_remedies: 3,
            max_kb_recipes: 3,
            max_generated_ingredients: 5,
            max_generated_recipes: 3,
            max_report_foods: 5,
            max_papers: 3,
            max_traditional_rows: 3,
            symptom_search_limit: default_symptom_search_limit(),
            candidate_limit: 5,
        }
    }
}

// --- Rule tables ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Severity when no keyword matches.
    #[serde(default = "default_severity")]
    pub default_severity: Severity,

    /// Advice when no lifestyle rule matches.
    #[serde(default = "default_advice")]
    pub default_advice: String,

    /// Trailing dosage-form suffixes stripped to build name variants.
    #[serde(default = "default_dosage_form_suffixes")]
    pub dosage_form_suffixes: Vec<String>,

    /// Units that mark a preceding token as a drug name (`500mg`).
    #[serde(default = "default_dosage_units")]
    pub dosage_units: Vec<String>,

    /// Trailing particles stripped from symptom tokens.
    #[serde(default = "default_token_particles")]
    pub token_particles: Vec<String>,

    /// Checked in order; the first keyword found in the reason wins.
    #[serde(default = "default_severity_keywords")]
    pub severity_keywords: Vec<SeverityKeyword>,

    #[serde(default = "default_symptom_synonyms")]
    pub symptom_synonyms: Vec<SynonymRule>,

    #[serde(default = "default_lifestyle_advice")]
    pub lifestyle_advice: Vec<AdviceRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityKeyword {
    pub keyword: String,
    pub severity: Severity,
}

/// If any pattern occurs in the input, search the knowledge base for `keyword`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymRule {
    pub keyword: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRule {
    pub keyword: String,
    pub advice: String,
}

fn default_severity() -> Severity {
    Severity::Caution
}
fn default_advice() -> String {
    "Keep regular meal times, drink enough water and get enough rest.".into()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_dosage_form_suffixes() -> Vec<String> {
    strings(&[
        "필름코팅정",
        "서방캡슐",
        "서방정",
        "현탁액",
        "캡슐",
        "시럽",
        "연고",
        "분말",
        "과립",
        "정",
        "액",
        "산",
        "환",
        "수",
        "주",
    ])
}
fn default_dosage_units() -> Vec<String> {
    strings(&["mg", "mcg", "g", "ml", "㎎", "밀리그램", "밀리그람"])
}
fn default_token_particles() -> Vec<String> {
    strings(&["이", "가", "요"])
}

fn default_severity_keywords() -> Vec<SeverityKeyword> {
    [
        ("병용금기", Severity::Contraindicated),
        ("금기", Severity::Contraindicated),
        ("contraindicated", Severity::Contraindicated),
        ("주의", Severity::Caution),
        ("상호작용", Severity::Caution),
    ]
    .into_iter()
    .map(|(keyword, severity)| SeverityKeyword {
        keyword: keyword.into(),
        severity,
    })
    .collect()
}

fn default_symptom_synonyms() -> Vec<SynonymRule> {
    [
        ("불면", &["수면", "잠", "불면", "못 자", "안 자", "깨"][..]),
        ("소화", &["소화", "위장", "더부룩", "체한", "소화불량"][..]),
        ("피로", &["피로", "지침", "기력", "힘이 없"][..]),
        ("두통", &["두통", "머리", "편두통"][..]),
        ("냉증", &["냉증", "손발", "차가", "냉한"][..]),
        ("혈압", &["혈압", "고혈압", "저혈압"][..]),
        ("당뇨", &["당뇨", "혈당"][..]),
        ("호흡", &["호흡", "기침", "가래", "숨"][..]),
        ("변비", &["변비", "배변", "대변"][..]),
    ]
    .into_iter()
    .map(|(keyword, patterns)| SynonymRule {
        keyword: keyword.into(),
        patterns: strings(patterns),
    })
    .collect()
}

fn default_lifestyle_advice() -> Vec<AdviceRule> {
    [
        (
            "수면",
            "Avoid screens for two hours before bed; a glass of warm milk can help.",
        ),
        (
            "불면",
            "Avoid screens for two hours before bed; a glass of warm milk can help.",
        ),
        (
            "소화",
            "A light 30-minute walk after meals helps digestion.",
        ),
    ]
    .into_iter()
    .map(|(keyword, advice)| AdviceRule {
        keyword: keyword.into(),
        advice: advice.into(),
    })
    .collect()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default_severity: default_severity(),
            default_advice: default_advice(),
            dosage_form_suffixes: default_dosage_form_suffixes(),
            dosage_units: default_dosage_units(),
            token_particles: default_token_particles(),
            severity_keywords: default_severity_keywords(),
            symptom_synonyms: default_symptom_synonyms(),
            lifestyle_advice: default_lifestyle_advice(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.remedium/config.toml).
    ///
    /// Also checks environment variables for credentials:
    /// - `KOREA_DRUG_API_KEY` (label, interaction and traditional registries)
    /// - `PUBMED_API_KEY`
    /// - `TAVILY_API_KEY`
    /// - `API_KEY`, then `OPENAI_API_KEY` (generative chain and translation)
    /// - `REMEDIUM_CACHE_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Fill credentials missing from the file using `lookup`.
    ///
    /// Values already present in the file win over the environment, except
    /// `REMEDIUM_CACHE_DIR`, which always wins.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup("KOREA_DRUG_API_KEY") {
            self.sources.label.api_key.get_or_insert_with(|| key.clone());
            self.sources.interactions.api_key.get_or_insert_with(|| key.clone());
            self.sources.traditional.api_key.get_or_insert(key);
        }
        if let Some(key) = lookup("PUBMED_API_KEY") {
            self.sources.literature.api_key.get_or_insert(key);
        }
        if let Some(key) = lookup("TAVILY_API_KEY") {
            self.sources.web.api_key.get_or_insert(key);
        }
        if let Some(key) = lookup("API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.generative.api_key.get_or_insert_with(|| key.clone());
            self.sources.translation.api_key.get_or_insert(key);
        }
        if let Some(dir) = lookup("REMEDIUM_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".remedium")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.cache.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "cache.similarity_threshold must be in (0, 1]".into(),
            ));
        }

        if self.cache.lock_stripes == 0 {
            return Err(ConfigError::ValidationError(
                "cache.lock_stripes must be > 0".into(),
            ));
        }

        for (name, hours) in self.cache.ttl.all() {
            if hours == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "cache.ttl.{name} must be > 0"
                )));
            }
        }

        for (name, source) in self.sources.all() {
            if source.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "sources.{name}.timeout_secs must be > 0"
                )));
            }
        }

        for endpoint in &self.generative.chain {
            if endpoint.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "generative endpoint '{}' timeout_secs must be > 0",
                    endpoint.name
                )));
            }
        }

        if self.rules.severity_keywords.iter().any(|k| k.keyword.is_empty()) {
            return Err(ConfigError::ValidationError(
                "rules.severity_keywords must not contain empty keywords".into(),
            ));
        }

        Ok(())
    }

    /// API key for a generative chain entry: its own, else the shared one.
    pub fn generative_key(&self, endpoint: &GenerativeEndpoint) -> Option<String> {
        endpoint
            .api_key
            .clone()
            .or_else(|| self.generative.api_key.clone())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for remedium_core::Error {
    fn from(e: ConfigError) -> Self {
        remedium_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.similarity_threshold, 0.85);
        assert_eq!(config.cache.ttl.label_hours, 168);
        assert_eq!(config.web.trusted_domains.len(), 8);
        assert_eq!(config.generative.chain.len(), 2);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.cache.similarity_threshold, config.cache.similarity_threshold);
        assert_eq!(parsed.rules.severity_keywords, config.rules.severity_keywords);
        assert_eq!(parsed.sources.web.api_url, config.sources.web.api_url);
    }

    #[test]
    fn invalid_threshold_rejected() {
        let mut config = AppConfig::default();
        config.cache.similarity_threshold = 0.0;
        assert!(config.validate().is_err());
        config.cache.similarity_threshold = 1.2;
        assert!(config.validate().is_err());
        config.cache.similarity_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut config = AppConfig::default();
        config.cache.ttl.web_hours = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("web_hours"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().pipeline.max_report_foods, 5);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[cache]
similarity_threshold = 0.8

[[rules.severity_keywords]]
keyword = "absolutely not"
severity = "CONTRAINDICATED"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.cache.similarity_threshold, 0.8);
        assert_eq!(config.cache.ttl.analysis_hours, 24);
        assert_eq!(config.rules.severity_keywords.len(), 1);
        assert_eq!(
            config.rules.severity_keywords[0].severity,
            Severity::Contraindicated
        );
        // Untouched tables keep their defaults.
        assert_eq!(config.rules.symptom_synonyms.len(), 9);
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "cache = [not toml").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_fills_missing_credentials() {
        let env: HashMap<&str, &str> = [
            ("KOREA_DRUG_API_KEY", "kd-key"),
            ("TAVILY_API_KEY", "tv-key"),
            ("OPENAI_API_KEY", "oa-key"),
            ("REMEDIUM_CACHE_DIR", "/var/cache/remedium"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.sources.web.api_key = Some("from-file".into());
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.sources.label.api_key.as_deref(), Some("kd-key"));
        assert_eq!(config.sources.interactions.api_key.as_deref(), Some("kd-key"));
        assert_eq!(config.sources.traditional.api_key.as_deref(), Some("kd-key"));
        assert_eq!(config.sources.web.api_key.as_deref(), Some("from-file"));
        assert!(config.sources.literature.api_key.is_none());
        assert_eq!(config.generative.api_key.as_deref(), Some("oa-key"));
        assert_eq!(config.sources.translation.api_key.as_deref(), Some("oa-key"));
        assert_eq!(
            config.cache.resolved_dir(),
            PathBuf::from("/var/cache/remedium")
        );
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(|name| (name == "PUBMED_API_KEY").then(|| "  ".to_string()));
        assert!(config.sources.literature.api_key.is_none());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig::default();
        config.sources.label.api_key = Some("super-secret".into());
        config.generative.api_key = Some("another-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("another-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn endpoint_key_falls_back_to_shared_key() {
        let mut config = AppConfig::default();
        config.generative.api_key = Some("shared".into());
        let endpoint = config.generative.chain[0].clone();
        assert_eq!(config.generative_key(&endpoint).as_deref(), Some("shared"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("similarity_threshold"));
        assert!(toml_str.contains("nedrug.mfds.go.kr"));
    }
}
