//! Shared setup: configuration, cache, knowledge base and engine.

use remedium_cache::CacheStore;
use remedium_config::AppConfig;
use remedium_core::knowledge::KnowledgeBase;
use remedium_engine::Engine;
use remedium_knowledge::InMemoryKnowledgeBase;
use std::sync::Arc;
use tracing::{info, warn};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn load_config() -> CliResult<AppConfig> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub fn open_cache(config: &AppConfig) -> CliResult<CacheStore> {
    let dir = config.cache.resolved_dir();
    let cache = CacheStore::with_stripes(&dir, config.cache.lock_stripes)
        .map_err(|e| format!("Failed to open cache at {}: {e}", dir.display()))?;
    Ok(cache)
}

/// The configured seed file, or an empty knowledge base.
pub fn load_knowledge(config: &AppConfig) -> CliResult<Arc<dyn KnowledgeBase>> {
    let kb = match &config.knowledge.seed_path {
        Some(path) => InMemoryKnowledgeBase::from_json_file(path)
            .map_err(|e| format!("Failed to load knowledge base: {e}"))?,
        None => {
            warn!("No knowledge.seed_path configured; every symptom will go to the generative model");
            InMemoryKnowledgeBase::new()
        }
    };
    Ok(Arc::new(kb))
}

pub fn load_engine() -> CliResult<Engine> {
    let config = load_config()?;
    let cache = open_cache(&config)?;
    let knowledge = load_knowledge(&config)?;
    let sources = remedium_sources::build_from_config(&config);
    info!(cache = %cache.dir().display(), "Engine ready");
    Ok(Engine::build(&config, sources, knowledge, Some(cache)))
}
