//! Text source for typed-in prescriptions.
//!
//! No OCR engine is bundled. Image input yields an empty extraction and the
//! pipeline continues with whatever text it has.

use async_trait::async_trait;
use remedium_core::source::{TextExtraction, TextInput, TextSource};
use tracing::warn;

#[derive(Debug, Default)]
pub struct ManualTextSource;

impl ManualTextSource {
    pub fn new() -> Self {
        Self
    }
}

/// Split text into trimmed, non-empty lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// A line that looks like a hospital or pharmacy letterhead.
fn guess_issuer(lines: &[String]) -> Option<String> {
    const MARKERS: [&str; 5] = ["병원", "의원", "약국", "Hospital", "Clinic"];
    lines
        .iter()
        .find(|l| MARKERS.iter().any(|m| l.contains(m)))
        .cloned()
}

#[async_trait]
impl TextSource for ManualTextSource {
    fn name(&self) -> &str {
        "manual"
    }

    async fn extract(&self, input: TextInput) -> TextExtraction {
        match input {
            TextInput::Manual(text) => {
                let lines = split_lines(&text);
                TextExtraction {
                    issuer: guess_issuer(&lines),
                    lines,
                    drug_names: Vec::new(),
                }
            }
            TextInput::Image { bytes, mime_type } => {
                warn!(
                    bytes = bytes.len(),
                    mime_type = %mime_type,
                    "No OCR engine configured, image input ignored"
                );
                TextExtraction::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_text_is_split_into_lines() {
        let source = ManualTextSource::new();
        let extraction = source
            .extract(TextInput::Manual("서울내과의원\n\n  타이레놀정 500mg \n아모잘탄정".into()))
            .await;
        assert_eq!(extraction.lines, vec!["서울내과의원", "타이레놀정 500mg", "아모잘탄정"]);
        assert_eq!(extraction.issuer.as_deref(), Some("서울내과의원"));
        assert!(extraction.drug_names.is_empty());
    }

    #[tokio::test]
    async fn image_input_yields_empty_extraction() {
        let source = ManualTextSource::new();
        let extraction = source
            .extract(TextInput::Image {
                bytes: vec![0xFF, 0xD8],
                mime_type: "image/jpeg".into(),
            })
            .await;
        assert!(extraction.lines.is_empty());
        assert!(extraction.issuer.is_none());
    }
}
