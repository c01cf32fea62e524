//! remedium CLI entry point.
//!
//! Commands:
//! - `symptom`       Resolve symptom text into food guidance
//! - `evidence`      Tiered evidence for one or more drugs
//! - `interactions`  Interaction check for a drug list
//! - `report`        Full analysis report, optionally streamed
//! - `cache`         Cache statistics and cleanup
//! - `warm-up`       Pre-compute analysis cache entries

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Blocking threads for cache file I/O.
const MAX_BLOCKING_THREADS: usize = 32;

#[derive(Parser)]
#[command(
    name = "remedium",
    about = "remedium: drug evidence, interaction checks and symptom-based food guidance",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve symptom text into food and recipe suggestions
    Symptom {
        /// Free-text symptom description
        text: String,

        /// Current medication (repeatable)
        #[arg(short, long = "drug")]
        drugs: Vec<String>,
    },

    /// Show tiered evidence for drugs
    Evidence {
        /// Drug names
        #[arg(required = true)]
        drugs: Vec<String>,
    },

    /// Check interactions between drugs
    Interactions {
        /// Drug or food names
        #[arg(required = true)]
        drugs: Vec<String>,
    },

    /// Build the full analysis report
    Report {
        /// Free-text symptom description
        #[arg(short, long)]
        symptom: Option<String>,

        /// Current medication (repeatable)
        #[arg(short, long = "drug")]
        drugs: Vec<String>,

        /// Text file with prescription contents, one item per line
        #[arg(short, long)]
        prescription: Option<PathBuf>,

        /// Print progress events as they happen
        #[arg(long)]
        stream: bool,
    },

    /// Cache administration
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Pre-compute analysis cache entries for a list of cases
    WarmUp {
        /// JSON file with `[{id, symptom, medications}]`; built-in cases if omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Pause between cases to stay under upstream rate limits
        #[arg(long, default_value_t = 0)]
        delay_secs: u64,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts and sizes
    Stats {
        /// Restrict to one namespace
        namespace: Option<String>,
    },

    /// Delete entries
    Clear {
        /// Namespace to clear
        namespace: Option<String>,

        /// Clear every namespace
        #[arg(long, conflicts_with = "namespace")]
        all: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(MAX_BLOCKING_THREADS)
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Symptom { text, drugs } => commands::analyze::symptom(&text, drugs).await,
            Commands::Evidence { drugs } => commands::analyze::evidence(drugs).await,
            Commands::Interactions { drugs } => commands::analyze::interactions(drugs).await,
            Commands::Report {
                symptom,
                drugs,
                prescription,
                stream,
            } => commands::analyze::report(symptom, drugs, prescription, stream).await,
            Commands::Cache { action } => match action {
                CacheAction::Stats { namespace } => commands::cache::stats(namespace.as_deref()).await,
                CacheAction::Clear { namespace, all } => {
                    commands::cache::clear(namespace.as_deref(), all).await
                }
            },
            Commands::WarmUp { file, delay_secs } => {
                commands::warm_up::run(file.as_deref(), delay_secs).await
            }
        }
    })
}
