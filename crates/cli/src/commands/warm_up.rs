//! `remedium warm-up`: pre-compute analysis cache entries.

use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};

use super::context::{CliResult, load_engine};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WarmUpCase {
    pub id: String,
    pub symptom: String,
    #[serde(default)]
    pub medications: Vec<Medication>,
}

/// A medication given either as a bare name or as `{ "name": ... }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Medication {
    Name(String),
    Detailed { name: String },
}

impl Medication {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name } => name,
        }
    }
}

impl WarmUpCase {
    pub fn drug_names(&self) -> Vec<String> {
        self.medications
            .iter()
            .map(|m| m.name().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

pub fn parse_cases(json: &str) -> Result<Vec<WarmUpCase>, serde_json::Error> {
    serde_json::from_str(json)
}

fn builtin_cases() -> Vec<WarmUpCase> {
    [
        ("indigestion", "속이 더부룩해요", &[][..]),
        ("insomnia", "잠이 잘 안 와요", &[][..]),
        ("headache", "머리가 지끈거려요", &["타이레놀정"][..]),
        ("hypertension", "혈압이 높아요", &["Amlodipine"][..]),
        ("fatigue", "피로가 안 풀려요", &[][..]),
    ]
    .into_iter()
    .map(|(id, symptom, drugs)| WarmUpCase {
        id: id.into(),
        symptom: symptom.into(),
        medications: drugs.iter().map(|d| Medication::Name(d.to_string())).collect(),
    })
    .collect()
}

pub async fn run(file: Option<&Path>, delay_secs: u64) -> CliResult {
    let cases = match file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            parse_cases(&json).map_err(|e| format!("Invalid cases file {}: {e}", path.display()))?
        }
        None => builtin_cases(),
    };
    let engine = load_engine()?;

    println!("🔥 Warming analysis cache with {} cases", cases.len());
    let total = cases.len();
    let mut failed = 0;
    for (i, case) in cases.iter().enumerate() {
        let started = Instant::now();
        let result = engine
            .analysis
            .pipeline()
            .resolve(&case.symptom, &case.drug_names())
            .await;
        let elapsed = started.elapsed().as_secs_f32();
        if result.is_error() {
            failed += 1;
            println!("  [{}/{total}] {} ❌ failed ({elapsed:.1}s)", i + 1, case.id);
        } else {
            println!(
                "  [{}/{total}] {} ✅ {:?} ({elapsed:.1}s)",
                i + 1,
                case.id,
                result.effective_provenance()
            );
        }
        if delay_secs > 0 && i + 1 < total {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        }
    }

    let snapshot = engine.metrics.snapshot();
    println!(
        "\n  Done: {} ok, {failed} failed, cache hit rate {:.0}%",
        total - failed,
        snapshot.cache_hit_rate * 100.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cases_accept_plain_and_detailed_medications() {
        let cases = parse_cases(
            r#"[
                {"id": "c1", "symptom": "두통", "medications": ["타이레놀정", {"name": "Aspirin", "dose": "100mg"}]},
                {"id": "c2", "symptom": "불면"}
            ]"#,
        )
        .unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].drug_names(), vec!["타이레놀정", "Aspirin"]);
        assert!(cases[1].drug_names().is_empty());
    }

    #[test]
    fn blank_medication_names_are_dropped() {
        let cases = parse_cases(r#"[{"id": "c", "symptom": "s", "medications": ["  "]}]"#).unwrap();
        assert!(cases[0].drug_names().is_empty());
    }

    #[test]
    fn builtin_cases_have_unique_ids() {
        let cases = builtin_cases();
        let mut ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), cases.len());
    }

    #[test]
    fn malformed_cases_file_is_an_error() {
        assert!(parse_cases(r#"{"id": "not a list"}"#).is_err());
    }
}
