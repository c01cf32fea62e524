//! `remedium symptom | evidence | interactions | report`.

use remedium_core::evidence::EvidenceRecord;
use remedium_core::event::ProgressEvent;
use remedium_core::recommendation::RecommendationResult;
use remedium_core::source::TextInput;
use remedium_engine::{AnalysisRequest, format_warnings};
use std::path::PathBuf;
use tokio_stream::StreamExt;

use super::context::{CliResult, load_engine};

pub async fn symptom(text: &str, drugs: Vec<String>) -> CliResult {
    let engine = load_engine()?;
    let result = engine.analysis.pipeline().resolve(text, &drugs).await;
    print_recommendation(&result);
    Ok(())
}

pub async fn evidence(drugs: Vec<String>) -> CliResult {
    let engine = load_engine()?;
    let records = engine.analysis.evidence().resolve_bulk(&drugs).await;
    for record in &records {
        print_evidence(record);
    }
    Ok(())
}

pub async fn interactions(drugs: Vec<String>) -> CliResult {
    let engine = load_engine()?;
    let facts = engine.analysis.interactions().check_interactions(&drugs).await;

    println!("💊 Interactions for {}", drugs.join(", "));
    if facts.is_empty() {
        println!("   No known interactions.");
    }
    for warning in format_warnings(&facts) {
        println!("   {warning}");
    }
    Ok(())
}

pub async fn report(
    symptom: Option<String>,
    drugs: Vec<String>,
    prescription: Option<PathBuf>,
    stream: bool,
) -> CliResult {
    let engine = load_engine()?;

    let mut request = AnalysisRequest {
        symptom_text: symptom,
        drugs,
        prescription: None,
    };
    if let Some(path) = prescription {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        request = request.with_prescription(TextInput::Manual(text));
    }

    if !stream {
        let report = engine.analysis.analyze(request).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut events = engine.analysis.analyze_stream(request);
    while let Some(event) = events.next().await {
        match event {
            ProgressEvent::Progress {
                stage,
                message,
                progress_percent,
            } => eprintln!("[{progress_percent:>3}%] {stage}. {message}"),
            ProgressEvent::Result { data } => println!("{}", serde_json::to_string_pretty(&data)?),
            ProgressEvent::Error { message } => return Err(message.into()),
        }
    }
    Ok(())
}

fn print_recommendation(result: &RecommendationResult) {
    println!("🩺 {}", result.summary_text);
    println!(
        "   Confidence: {:?}  Source: {:?}",
        result.confidence,
        result.effective_provenance()
    );
    if let Some(symptom) = &result.matched_symptom {
        println!("   Matched:    {symptom}");
    }
    if !result.ingredients.is_empty() {
        println!("\n   Foods:");
        for ingredient in &result.ingredients {
            println!(
                "   - {} [{:?}] {}",
                ingredient.display_name, ingredient.polarity, ingredient.rationale
            );
        }
    }
    if !result.recipes.is_empty() {
        println!("\n   Recipes:");
        for recipe in &result.recipes {
            println!("   - {}", recipe.title);
        }
    }
    if !result.cautions.is_empty() {
        println!("\n   Cautions:");
        for warning in format_warnings(&result.cautions) {
            println!("   {warning}");
        }
    }
}

fn print_evidence(record: &EvidenceRecord) {
    println!(
        "📚 {} (tier {:?}, trust {})",
        record.subject_name,
        record.tier,
        record.trust_level()
    );
    if let Some(manufacturer) = &record.manufacturer {
        println!("   Manufacturer: {manufacturer}");
    }
    println!("   Efficacy: {}", record.efficacy_summary);
    if !record.risk_summary.is_empty() {
        println!("   Risks:    {}", record.risk_summary);
    }
    for citation in &record.citations {
        println!("   - {} <{}>", citation.title, citation.url);
    }
    println!();
}
