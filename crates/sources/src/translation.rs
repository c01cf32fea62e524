//! Korean to English translation for literature queries.

use async_trait::async_trait;
use remedium_core::source::TranslationClient;
use std::time::Duration;
use tracing::warn;

use crate::http::{read_json, send_error};

pub struct GoogleTranslator {
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl GoogleTranslator {
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

    async fn try_translate(&self, api_key: &str, text: &str) -> Option<String> {
        let response = self
            .client
            .post(&self.api_url)
            .query(&[
                ("q", text),
                ("source", "ko"),
                ("target", "en"),
                ("format", "text"),
                ("key", api_key),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(self.name(), self.timeout, e))
            .inspect_err(|e| warn!(error = %e, "Translation request failed"))
            .ok()?;

        let data = read_json(self.name(), response).await.ok()?;
        parse_translation(&data)
    }
}

/// `data.translations[0].translatedText`.
pub fn parse_translation(data: &serde_json::Value) -> Option<String> {
    data.pointer("/data/translations/0/translatedText")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl TranslationClient for GoogleTranslator {
    fn name(&self) -> &str {
        "google_translate"
    }

    async fn translate(&self, text: &str) -> String {
        let Some(api_key) = &self.api_key else {
            return text.to_string();
        };
        if text.is_ascii() || text.trim().is_empty() {
            return text.to_string();
        }

        self.try_translate(api_key, text)
            .await
            .unwrap_or_else(|| text.to_string())
    }
}
