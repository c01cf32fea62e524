//! Tavily web search.

use async_trait::async_trait;
use remedium_core::error::SourceError;
use remedium_core::source::{WebPage, WebQuery, WebSearch, WebSearchResponse};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::http::{malformed, read_json, send_error};

pub struct TavilySearch {
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    include_answer: bool,
    #[serde(skip_serializing_if = "no_domains")]
    include_domains: &'a [String],
    max_results: usize,
}

fn no_domains(domains: &&[String]) -> bool {
    domains.is_empty()
}

impl TavilySearch {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
            client,
        }
    }
}

/// Decode `{answer, results: [{title, url, content, score}]}`.
pub fn parse_search_response(data: serde_json::Value) -> Result<WebSearchResponse, SourceError> {
    #[derive(serde::Deserialize)]
    struct Raw {
        #[serde(default)]
        answer: Option<String>,
        #[serde(default)]
        results: Vec<WebPage>,
    }

    let raw: Raw = serde_json::from_value(data).map_err(|e| malformed("tavily", e.to_string()))?;
    Ok(WebSearchResponse {
        answer: raw.answer.unwrap_or_default(),
        results: raw.results,
    })
}

#[async_trait]
impl WebSearch for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &WebQuery) -> Result<WebSearchResponse, SourceError> {
        let Some(api_key) = &self.api_key else {
            return Err(SourceError::NotConfigured("TAVILY_API_KEY".into()));
        };

        debug!(query = %query.query, domains = query.include_domains.len(), "Web search");
        let body = SearchRequest {
            api_key,
            query: &query.query,
            search_depth: "basic",
            include_answer: query.include_answer,
            include_domains: &query.include_domains,
            max_results: query.max_results,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(self.name(), self.timeout, e))?;

        let data = read_json(self.name(), response).await?;
        parse_search_response(data)
    }
}
