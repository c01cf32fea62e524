//! Drug Utilization Review (DUR) co-administration registry.
//!
//! The registry stores pairs as (product 1, product 2). A lookup searches
//! both columns so a drug is found whichever side it was filed on, and
//! every row is normalised so `source_drug` is the side that matched.

use async_trait::async_trait;
use remedium_core::error::SourceError;
use remedium_core::source::{InteractionRegistry, InteractionRow};
use std::time::Duration;
use tracing::{debug, warn};

use crate::http::{read_json, send_error, str_field};

/// Column names for one search direction.
struct Direction {
    product_a: &'static str,
    product_b: &'static str,
    ingredient_a: &'static str,
    ingredient_b: &'static str,
}

const DIRECTIONS: [Direction; 2] = [
    Direction {
        product_a: "제품명1",
        product_b: "제품명2",
        ingredient_a: "성분명1",
        ingredient_b: "성분명2",
    },
    Direction {
        product_a: "제품명2",
        product_b: "제품명1",
        ingredient_a: "성분명2",
        ingredient_b: "성분명1",
    },
];

pub struct DurRegistry {
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl DurRegistry {
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

    async fn fetch_direction(
        &self,
        api_key: &str,
        drug_name: &str,
        direction: &Direction,
    ) -> Result<Vec<InteractionRow>, SourceError> {
        let condition = format!("cond[{}::LIKE]", direction.product_a);
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("serviceKey", api_key),
                ("page", "1"),
                ("perPage", "100"),
                ("returnType", "JSON"),
                (condition.as_str(), drug_name),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(self.name(), self.timeout, e))?;

        let data = read_json(self.name(), response).await?;
        Ok(parse_rows(&data, direction))
    }
}

fn parse_rows(data: &serde_json::Value, direction: &Direction) -> Vec<InteractionRow> {
    data.get("data")
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| InteractionRow {
                    source_drug: str_field(item, direction.product_a),
                    other_drug: str_field(item, direction.product_b),
                    ingredient_a: str_field(item, direction.ingredient_a),
                    ingredient_b: str_field(item, direction.ingredient_b),
                    reason: str_field(item, "금기사유"),
                    notice_date: str_field(item, "공고일자"),
                })
                .filter(|row| !row.other_drug.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl InteractionRegistry for DurRegistry {
    fn name(&self) -> &str {
        "dur"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Rows from both directions. Fails only if both directions failed.
    async fn lookup(&self, drug_name: &str) -> Result<Vec<InteractionRow>, SourceError> {
        let Some(api_key) = &self.api_key else {
            return Err(SourceError::NotConfigured("KOREA_DRUG_API_KEY".into()));
        };

        debug!(drug = drug_name, "Querying interaction registry");
        let (forward, backward) = tokio::join!(
            self.fetch_direction(api_key, drug_name, &DIRECTIONS[0]),
            self.fetch_direction(api_key, drug_name, &DIRECTIONS[1]),
        );

        let mut rows = Vec::new();
        let mut succeeded = 0usize;
        let mut last_error = None;
        for (result, direction) in [(forward, &DIRECTIONS[0]), (backward, &DIRECTIONS[1])] {
            match result {
                Ok(found) => {
                    succeeded += 1;
                    rows.extend(found);
                }
                Err(e) => {
                    warn!(drug = drug_name, column = direction.product_a, error = %e, "Registry direction failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(rows),
        }
    }
}
