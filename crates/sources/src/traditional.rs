//! Traditional prescription registry (SimPreInfoService).
//!
//! One XML round trip returns two capped sections: prescriptions similar to
//! the query (`preItems`) and Korean-medicine papers (`thesisItems`). Each
//! section also carries the registry-side `totalCount`.

use async_trait::async_trait;
use remedium_core::error::SourceError;
use remedium_core::source::{
    TkmPaper, TraditionalMedicineSearch, TraditionalPrescription, TraditionalSearchResult,
};
use std::time::Duration;
use tracing::debug;

use crate::http::{malformed, read_text, send_error};

const REGISTRY_SOURCE: &str = "KOREANTK";
const OK_CODE: &str = "00";

pub struct SimPreSearch {
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl SimPreSearch {
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

/// Inner text of the first `<tag>` element, trimmed. CDATA wrappers and the
/// five predefined entities are unwrapped.
fn element(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(unescape(xml[start..end].trim()))
}

fn text(xml: &str, tag: &str) -> String {
    element(xml, tag).unwrap_or_default()
}

/// Every `<tag>...</tag>` body, in document order.
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut bodies = Vec::new();
    let mut rest = xml;
    while let Some(at) = rest.find(&open) {
        let body_start = at + open.len();
        let Some(len) = rest[body_start..].find(&close) else {
            break;
        };
        bodies.push(&rest[body_start..body_start + len]);
        rest = &rest[body_start + len + close.len()..];
    }
    bodies
}

/// The raw body of the first `<tag>` section, without unescaping.
fn section<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    elements(xml, tag).into_iter().next()
}

fn unescape(raw: &str) -> String {
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|r| r.strip_suffix("]]>"))
        .unwrap_or(raw);
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// `YYYYMMDD` becomes `YYYY-MM-DD`; anything else is kept as given.
pub fn format_registry_date(raw: &str) -> String {
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}

fn total_count(section: Option<&str>) -> usize {
    section
        .and_then(|s| element(s, "totalCount"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Parse a registry response. A result code other than `00` is an error.
pub fn parse_registry_xml(
    query: &str,
    xml: &str,
    rows: usize,
) -> Result<TraditionalSearchResult, SourceError> {
    let code = element(xml, "resultCode")
        .ok_or_else(|| malformed("simpre", "missing resultCode"))?;
    if code != OK_CODE {
        return Err(SourceError::Unavailable {
            source_name: "simpre".into(),
            reason: format!("result code {code}: {}", text(xml, "resultMsg")),
        });
    }

    let pre_items = section(xml, "preItems");
    let prescriptions = pre_items
        .map(|s| elements(s, "item"))
        .unwrap_or_default()
        .into_iter()
        .take(rows)
        .map(|item| TraditionalPrescription {
            code: text(item, "preCd"),
            name: text(item, "preNm"),
            ingredients: text(item, "preMed"),
            source: REGISTRY_SOURCE.into(),
        })
        .filter(|p| !p.name.is_empty())
        .collect();

    let thesis_items = section(xml, "thesisItems");
    let papers = thesis_items
        .map(|s| elements(s, "item"))
        .unwrap_or_default()
        .into_iter()
        .take(rows)
        .map(|item| TkmPaper {
            control_no: text(item, "ctrlNo"),
            title: text(item, "ttl"),
            journal: text(item, "jrlTtl"),
            published: format_registry_date(&text(item, "pubDt")),
            pages: text(item, "pg"),
            keywords: text(item, "keywrdMed"),
        })
        .filter(|p| !p.title.is_empty())
        .collect();

    Ok(TraditionalSearchResult {
        query: query.to_string(),
        prescriptions,
        papers,
        total_prescriptions: total_count(pre_items),
        total_papers: total_count(thesis_items),
    })
}

#[async_trait]
impl TraditionalMedicineSearch for SimPreSearch {
    fn name(&self) -> &str {
        "simpre"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str, rows: usize) -> Result<TraditionalSearchResult, SourceError> {
        let Some(api_key) = &self.api_key else {
            return Err(SourceError::NotConfigured("KOREA_DRUG_API_KEY".into()));
        };

        debug!(query, rows, "Querying traditional prescription registry");
        let num_rows = rows.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("serviceKey", api_key.as_str()),
                ("pageNo", "1"),
                ("numOfRows", num_rows.as_str()),
                ("query", query),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(self.name(), self.timeout, e))?;

        let xml = read_text(self.name(), response).await?;
        parse_registry_xml(query, &xml, rows)
    }
}
