//! Error types for the remedium domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Most of these never reach
//! a caller: every external-call site converts its own failure into an empty
//! value and logs it. Only `Error::Pipeline` describes a failure of the
//! resolution logic itself.

use thiserror::Error;

/// The top-level error type for all remedium operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- External source errors ---
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Knowledge base errors ---
    #[error("Knowledge base error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The resolution pipeline's own merge/decision logic failed.
    #[error("Pipeline failure: {0}")]
    Pipeline(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure of one external collaborator (registry, literature, web search,
/// generative model, translation).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Source not configured: {0}")]
    NotConfigured(String),

    #[error("Source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Source {source_name} timed out after {timeout_secs}s")]
    Timeout {
        source_name: String,
        timeout_secs: u64,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Malformed response from {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },
}

impl SourceError {
    /// Whether this error means the source could not be reached or used at all,
    /// as opposed to answering with something unusable.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::Malformed { .. })
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Failed to load knowledge base: {0}")]
    Load(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session storage failed: {0}")]
    Storage(String),
}
