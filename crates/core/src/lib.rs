//! # remedium core
//!
//! Domain types, collaborator traits, and error definitions for the remedium
//! evidence engine. This crate does no I/O. It defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability (drug registries, literature and web search,
//! generative models, OCR, the curated knowledge base, session storage) is a
//! trait here. Implementations live in their respective crates. This enables:
//! - Running the engine with any subset of sources configured
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod evidence;
pub mod interaction;
pub mod knowledge;
pub mod recommendation;
pub mod session;
pub mod source;

// Re-export key types at crate root for ergonomics
pub use error::{CacheError, Error, KnowledgeError, Result, SessionError, SourceError};
pub use event::ProgressEvent;
pub use evidence::{Citation, EvidenceRecord, EvidenceTier, TrustLevel};
pub use interaction::{InteractionFact, PairKey, Severity, SourceOrigin};
pub use knowledge::{CatalogDrug, KnowledgeBase, SymptomRow};
pub use recommendation::{
    Confidence, Ingredient, Polarity, Provenance, Recipe, RecommendationResult,
};
pub use session::{SearchKind, Session, SessionId, SessionStore};
pub use source::{
    DrugLabel, GenerativeClient, InteractionRegistry, InteractionRow, LabelRegistry,
    LiteratureSearch, Paper, TextExtraction, TextInput, TextSource, TkmPaper,
    TraditionalMedicineSearch, TraditionalPrescription, TraditionalSearchResult, TranslationClient,
    WebPage, WebQuery, WebSearch, WebSearchResponse,
};
