//! Government drug label registry (e약은요 easy-drug-info service).
//!
//! Returns raw rows for one search term. Name variants, relevance selection
//! and caching are the caller's job.

use async_trait::async_trait;
use remedium_core::error::SourceError;
use remedium_core::source::{DrugLabel, LabelRegistry};
use std::time::Duration;
use tracing::debug;

use crate::http::{read_json, send_error, str_field};

pub struct MfdsLabelRegistry {
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl MfdsLabelRegistry {
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

/// Pull label rows out of the public-data envelope `{body: {items: [...]}}`.
///
/// A single result may arrive as an object instead of an array.
pub fn parse_label_items(data: &serde_json::Value) -> Vec<DrugLabel> {
    let items = match data.pointer("/body/items") {
        Some(serde_json::Value::Array(items)) => items.clone(),
        Some(item @ serde_json::Value::Object(_)) => vec![item.clone()],
        _ => Vec::new(),
    };
    items
        .iter()
        .map(|item| DrugLabel {
            item_name: str_field(item, "itemName"),
            item_seq: str_field(item, "itemSeq"),
            manufacturer: str_field(item, "entpName"),
            efficacy: str_field(item, "efcyQesitm"),
            usage: str_field(item, "useMethodQesitm"),
            precautions: str_field(item, "atpnQesitm"),
            warn_precautions: str_field(item, "atpnWarnQesitm"),
            interactions: str_field(item, "intrcQesitm"),
            side_effects: str_field(item, "seQesitm"),
            storage: str_field(item, "depositMethodQesitm"),
            image_url: str_field(item, "itemImage"),
        })
        .filter(|label| !label.item_name.is_empty())
        .collect()
}

#[async_trait]
impl LabelRegistry for MfdsLabelRegistry {
    fn name(&self) -> &str {
        "mfds"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, term: &str) -> Result<Vec<DrugLabel>, SourceError> {
        let Some(api_key) = &self.api_key else {
            return Err(SourceError::NotConfigured("KOREA_DRUG_API_KEY".into()));
        };

        debug!(term, "Querying label registry");
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("serviceKey", api_key.as_str()),
                ("itemName", term),
                ("pageNo", "1"),
                ("numOfRows", "3"),
                ("type", "json"),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(self.name(), self.timeout, e))?;

        let data = read_json(self.name(), response).await?;
        Ok(parse_label_items(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_item_array() {
        let data = json!({
            "header": {"resultCode": "00"},
            "body": {"items": [
                {"itemName": "타이레놀정500밀리그램", "entpName": "한국존슨앤드존슨", "efcyQesitm": "<p>두통, 치통</p>", "itemImage": null},
                {"itemName": "", "entpName": "ignored"}
            ]}
        });
        let labels = parse_label_items(&data);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].manufacturer, "한국존슨앤드존슨");
        assert_eq!(labels[0].efficacy, "<p>두통, 치통</p>");
        assert!(labels[0].image_url.is_empty());
    }

    #[test]
    fn parses_single_object() {
        let data = json!({"body": {"items": {"itemName": "부루펜정"}}});
        assert_eq!(parse_label_items(&data)[0].item_name, "부루펜정");
    }

    #[test]
    fn empty_envelope_yields_nothing() {
        assert!(parse_label_items(&json!({"body": {"items": ""}})).is_empty());
        assert!(parse_label_items(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn unconfigured_registry_refuses_without_network() {
        let registry = MfdsLabelRegistry::new(
            "http://127.0.0.1:9/unused",
            Some(String::new()),
            Duration::from_secs(1),
            reqwest::Client::new(),
        );
        assert!(!registry.is_configured());
        assert!(matches!(
            registry.search("타이레놀").await,
            Err(SourceError::NotConfigured(_))
        ));
    }
}
