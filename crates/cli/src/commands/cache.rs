//! `remedium cache`: cache statistics and cleanup.

use super::context::{CliResult, load_config, open_cache};

pub async fn stats(namespace: Option<&str>) -> CliResult {
    let config = load_config()?;
    let cache = open_cache(&config)?;
    let stats = cache.stats(namespace).await?;

    println!("🗄️  Cache Statistics");
    println!("====================");
    println!("  Directory:  {}", cache.dir().display());
    println!("  Files:      {}", stats.file_count);
    println!("  Size:       {:.2} MB", stats.total_size_mb());
    for (name, ns) in &stats.namespaces {
        println!("  {name:<14} {:>6} files  {:>8.2} MB", ns.count, ns.size_mb());
    }
    Ok(())
}

pub async fn clear(namespace: Option<&str>, all: bool) -> CliResult {
    let config = load_config()?;
    let cache = open_cache(&config)?;

    let removed = match (namespace, all) {
        (_, true) => cache.clear_all().await?,
        (Some(namespace), false) => cache.clear_namespace(namespace).await?,
        (None, false) => {
            println!("⚠️  Nothing cleared. Name a namespace or pass --all:");
            println!("   remedium cache clear ai_analysis");
            println!("   remedium cache clear --all");
            return Ok(());
        }
    };
    println!("🗑️  Removed {removed} cache entries.");
    Ok(())
}
