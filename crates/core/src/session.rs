//! Short-lived state for step-wise analysis.
//!
//! Sessions live behind a `SessionStore` so the backing can be swapped
//! (in-memory for tests and single-process use, an external store in
//! production) without the analysis code knowing which one it talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the person started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Symptom,
    Prescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub kind: SearchKind,
    /// The text the keywords were taken from (typed text or OCR output).
    pub raw_text: String,
    /// Current keyword set; replaced when the person confirms keywords.
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(kind: SearchKind, raw_text: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            id: SessionId::new(),
            kind,
            raw_text: raw_text.into(),
            keywords,
            created_at: Utc::now(),
        }
    }
}

/// Pluggable session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session: Session) -> Result<(), SessionError>;

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionError>;

    /// Remove a session, returning whether it existed.
    async fn remove(&self, id: &SessionId) -> Result<bool, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&SearchKind::Prescription).unwrap();
        assert_eq!(json, r#""prescription""#);
    }
}
