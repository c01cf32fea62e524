//! Collaborator traits: the abstraction over external services.
//!
//! Every network-backed capability the engine consumes is a trait here.
//! Implementations live in `remedium-sources`; tests use in-process mocks.
//! None of these traits promise any ordering of returned rows: relevance
//! selection is the engine's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// One row from the authoritative drug label registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrugLabel {
    pub item_name: String,
    #[serde(default)]
    pub item_seq: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub efficacy: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub precautions: String,
    #[serde(default)]
    pub warn_precautions: String,
    #[serde(default)]
    pub interactions: String,
    #[serde(default)]
    pub side_effects: String,
    #[serde(default)]
    pub storage: String,
    #[serde(default)]
    pub image_url: String,
}

/// A literature search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub journal: String,
    #[serde(default)]
    pub pub_year: Option<i32>,
    pub url: String,
}

/// A web search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebPage {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

/// A web search response: an optional synthesized answer plus hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub results: Vec<WebPage>,
}

impl WebSearchResponse {
    pub fn is_empty(&self) -> bool {
        self.answer.trim().is_empty() && self.results.is_empty()
    }
}

/// A web search request.
#[derive(Debug, Clone, PartialEq)]
pub struct WebQuery {
    pub query: String,
    /// Restrict hits to these domains; empty = unrestricted.
    pub include_domains: Vec<String>,
    pub max_results: usize,
    pub include_answer: bool,
}

/// One raw candidate row from the interaction registry.
///
/// The registry pairs `source_drug` with `other_drug` on its own terms; the
/// caller must cross-check `other_drug` against the drugs it actually holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionRow {
    pub source_drug: String,
    pub other_drug: String,
    #[serde(default)]
    pub ingredient_a: String,
    #[serde(default)]
    pub ingredient_b: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notice_date: String,
}

/// A traditional Korean-medicine prescription (formula).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraditionalPrescription {
    pub code: String,
    pub name: String,
    /// Constituent herbs as the registry lists them, comma separated.
    #[serde(default)]
    pub ingredients: String,
    /// Where the row came from, e.g. `KOREANTK` or `local_kb`.
    #[serde(default)]
    pub source: String,
}

/// A Korean-medicine journal paper linked to a prescription search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TkmPaper {
    #[serde(default)]
    pub control_no: String,
    pub title: String,
    #[serde(default)]
    pub journal: String,
    /// `YYYY-MM-DD` when the registry gave a full date.
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub pages: String,
    #[serde(default)]
    pub keywords: String,
}

/// One answer from the traditional prescription registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraditionalSearchResult {
    pub query: String,
    #[serde(default)]
    pub prescriptions: Vec<TraditionalPrescription>,
    #[serde(default)]
    pub papers: Vec<TkmPaper>,
    /// Registry-side totals; the lists above are capped.
    #[serde(default)]
    pub total_prescriptions: usize,
    #[serde(default)]
    pub total_papers: usize,
}

/// The government drug label registry.
#[async_trait]
pub trait LabelRegistry: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a credential is present. Unconfigured registries are skipped
    /// without any network call.
    fn is_configured(&self) -> bool {
        true
    }

    /// Look up labels whose item name matches `term`.
    async fn search(&self, term: &str) -> Result<Vec<DrugLabel>, SourceError>;
}

/// Clinical literature search.
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>, SourceError>;
}

/// Ad-hoc web search.
#[async_trait]
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    async fn search(&self, query: &WebQuery) -> Result<WebSearchResponse, SourceError>;
}

/// Registry of traditional prescriptions and Korean-medicine papers similar
/// to a keyword query.
#[async_trait]
pub trait TraditionalMedicineSearch: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    /// At most `rows` prescriptions and `rows` papers for `query`.
    async fn search(&self, query: &str, rows: usize) -> Result<TraditionalSearchResult, SourceError>;
}

/// Drug-drug interaction registry.
#[async_trait]
pub trait InteractionRegistry: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    async fn lookup(&self, drug_name: &str) -> Result<Vec<InteractionRow>, SourceError>;
}

/// Prompt-in, structured-JSON-out generative model.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    fn name(&self) -> &str;

    /// Generate a JSON value for `prompt`, described by `schema`.
    ///
    /// An unparseable answer must be reported as `SourceError::Malformed`;
    /// callers treat it exactly like a service failure.
    async fn generate(
        &self,
        prompt: &str,
        schema: &str,
    ) -> Result<serde_json::Value, SourceError>;
}

/// Best-effort translation for cross-language literature search.
#[async_trait]
pub trait TranslationClient: Send + Sync {
    fn name(&self) -> &str;

    /// Translate `text` to the target language. Never fails: on any error
    /// the input is returned unchanged.
    async fn translate(&self, text: &str) -> String;
}

/// Input handed to a text source.
#[derive(Debug, Clone)]
pub enum TextInput {
    /// Raw image bytes plus their MIME type.
    Image { bytes: Vec<u8>, mime_type: String },
    /// Text typed in by a person.
    Manual(String),
}

/// What a text source could read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextExtraction {
    /// Lines in reading order.
    pub lines: Vec<String>,
    /// Best guess of the issuing hospital / pharmacy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Best guess of the drug names present, if the source can tell.
    #[serde(default)]
    pub drug_names: Vec<String>,
}

impl TextExtraction {
    pub fn combined_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// OCR or manual input. Never fails: an unreadable input yields an empty
/// extraction so later stages can still run on whatever text exists.
#[async_trait]
pub trait TextSource: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, input: TextInput) -> TextExtraction;
}
