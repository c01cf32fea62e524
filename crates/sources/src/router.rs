//! Source wiring: builds every collaborator client from configuration.

use remedium_config::AppConfig;
use remedium_core::source::{
    GenerativeClient, InteractionRegistry, LabelRegistry, LiteratureSearch, TextSource,
    TraditionalMedicineSearch, TranslationClient, WebSearch,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::fallback::GeneratorChain;
use crate::generative::OpenAiJsonClient;
use crate::interactions::DurRegistry;
use crate::label::MfdsLabelRegistry;
use crate::literature::PubMedSearch;
use crate::text::ManualTextSource;
use crate::traditional::SimPreSearch;
use crate::translation::GoogleTranslator;
use crate::web::TavilySearch;

/// Every external collaborator the engine consumes.
#[derive(Clone)]
pub struct SourceSet {
    pub label: Arc<dyn LabelRegistry>,
    pub interactions: Arc<dyn InteractionRegistry>,
    pub literature: Arc<dyn LiteratureSearch>,
    pub web: Arc<dyn WebSearch>,
    pub translator: Arc<dyn TranslationClient>,
    pub generator: Arc<dyn GenerativeClient>,
    pub text: Arc<dyn TextSource>,
    pub traditional: Arc<dyn TraditionalMedicineSearch>,
}

/// Build the generator chain. Endpoints without any usable key are skipped.
pub fn build_generator(config: &AppConfig, client: &reqwest::Client) -> GeneratorChain {
    let mut chain = GeneratorChain::new("generative");
    for endpoint in &config.generative.chain {
        let Some(api_key) = config.generative_key(endpoint) else {
            info!(endpoint = %endpoint.name, "Generative endpoint has no API key, skipping");
            continue;
        };
        let timeout = Duration::from_secs(endpoint.timeout_secs);
        let generator = OpenAiJsonClient::new(
            &endpoint.name,
            &endpoint.api_url,
            api_key,
            &endpoint.model,
            client.clone(),
        )
        .with_temperature(config.generative.temperature)
        .with_timeout(timeout);
        chain = chain.link_endpoint(Arc::new(generator), endpoint);
    }
    chain
}

/// Build sources from configuration.
pub fn build_from_config(config: &AppConfig) -> SourceSet {
    let client = reqwest::Client::new();
    let sources = &config.sources;
    let timeout = |secs: u64| Duration::from_secs(secs);

    let translator: Arc<dyn TranslationClient> = Arc::new(GoogleTranslator::new(
        &sources.translation.api_url,
        sources.translation.api_key.clone(),
        timeout(sources.translation.timeout_secs),
        client.clone(),
    ));

    let literature = PubMedSearch::new(
        &sources.literature.api_url,
        sources.literature.api_key.clone(),
        timeout(sources.literature.timeout_secs),
        client.clone(),
    )
    .with_translator(translator.clone());

    let generator = build_generator(config, &client);
    info!(
        label = sources.label.api_key.is_some(),
        web = sources.web.api_key.is_some(),
        traditional = sources.traditional.api_key.is_some(),
        generators = generator.len(),
        "Sources configured"
    );

    SourceSet {
        label: Arc::new(MfdsLabelRegistry::new(
            &sources.label.api_url,
            sources.label.api_key.clone(),
            timeout(sources.label.timeout_secs),
            client.clone(),
        )),
        interactions: Arc::new(DurRegistry::new(
            &sources.interactions.api_url,
            sources.interactions.api_key.clone(),
            timeout(sources.interactions.timeout_secs),
            client.clone(),
        )),
        literature: Arc::new(literature),
        web: Arc::new(TavilySearch::new(
            &sources.web.api_url,
            sources.web.api_key.clone(),
            timeout(sources.web.timeout_secs),
            client.clone(),
        )),
        translator,
        generator: Arc::new(generator),
        text: Arc::new(ManualTextSource::new()),
        traditional: Arc::new(SimPreSearch::new(
            &sources.traditional.api_url,
            sources.traditional.api_key.clone(),
            timeout(sources.traditional.timeout_secs),
            client,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unkeyed_config_builds_unconfigured_sources() {
        let sources = build_from_config(&AppConfig::default());
        assert!(!sources.label.is_configured());
        assert!(!sources.interactions.is_configured());
        assert!(!sources.web.is_configured());
        assert!(!sources.traditional.is_configured());
        assert_eq!(sources.generator.name(), "generative");
    }

    #[test]
    fn generator_chain_uses_keyed_endpoints_only() {
        let mut config = AppConfig::default();
        assert!(build_generator(&config, &reqwest::Client::new()).is_empty());

        config.generative.api_key = Some("sk-shared".into());
        let chain = build_generator(&config, &reqwest::Client::new());
        assert_eq!(chain.len(), config.generative.chain.len());
        assert_eq!(
            chain.timeouts(),
            vec![Duration::from_secs(30), Duration::from_secs(45)]
        );
    }

    #[test]
    fn keyed_config_marks_sources_configured() {
        let mut config = AppConfig::default();
        config.apply_env(|name| match name {
            "KOREA_DRUG_API_KEY" => Some("k".into()),
            "TAVILY_API_KEY" => Some("t".into()),
            _ => None,
        });
        let sources = build_from_config(&config);
        assert!(sources.label.is_configured());
        assert!(sources.interactions.is_configured());
        assert!(sources.web.is_configured());
        assert!(sources.traditional.is_configured());
    }
}
