//! Evidence records: what the tier resolver knows about one drug.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered evidence sources, most trusted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceTier {
    /// Government drug label registry.
    Authoritative,
    /// Clinical literature search.
    Literature,
    /// Web search restricted to trusted medical domains.
    Web,
    /// Nothing found in any tier.
    None,
}

impl EvidenceTier {
    /// Coarse trust grade surfaced to callers.
    pub fn trust_level(self) -> TrustLevel {
        match self {
            Self::Authoritative => TrustLevel::A,
            Self::Literature => TrustLevel::B,
            Self::Web | Self::None => TrustLevel::C,
        }
    }
}

/// A / B / C grade attached to a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustLevel {
    A,
    B,
    C,
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        f.write_str(s)
    }
}

/// A paper or web page backing a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

/// Normalised evidence about one subject (drug name).
///
/// Built once by the tier resolver and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// The subject exactly as requested.
    pub subject_name: String,

    /// The tier that supplied `efficacy_summary` / `risk_summary`.
    pub tier: EvidenceTier,

    pub efficacy_summary: String,

    pub risk_summary: String,

    /// Supporting citations; may come from a lower tier than `tier`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
}

/// Efficacy text used when every tier came back empty.
pub const NO_DATA_MESSAGE: &str = "Could not retrieve information for this drug.";

impl EvidenceRecord {
    /// The sentinel record for a subject no tier could resolve.
    pub fn no_data(subject_name: impl Into<String>) -> Self {
        Self {
            subject_name: subject_name.into(),
            tier: EvidenceTier::None,
            efficacy_summary: NO_DATA_MESSAGE.into(),
            risk_summary: String::new(),
            citations: Vec::new(),
            manufacturer: None,
        }
    }

    pub fn trust_level(&self) -> TrustLevel {
        self.tier.trust_level()
    }

    pub fn is_resolved(&self) -> bool {
        self.tier != EvidenceTier::None
    }
}
