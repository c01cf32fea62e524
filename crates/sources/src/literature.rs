//! PubMed literature search over the NCBI E-utilities.
//!
//! Two round trips: `esearch` for PMIDs, then `efetch` for article XML.
//! Non-ASCII queries are translated to English first when a translator is
//! attached.

use async_trait::async_trait;
use regex_lite::Regex;
use remedium_core::error::SourceError;
use remedium_core::source::{LiteratureSearch, Paper, TranslationClient};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::http::{malformed, read_json, read_text, send_error, truncate};

const TITLE_CHARS: usize = 200;
const ABSTRACT_CHARS: usize = 500;

pub struct PubMedSearch {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
    translator: Option<Arc<dyn TranslationClient>>,
}

impl PubMedSearch {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
            client,
            translator: None,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn TranslationClient>) -> Self {
        self.translator = Some(translator);
        self
    }

    async fn search_ids(&self, term: &str, max_results: usize) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let retmax = max_results.to_string();
        let mut params = vec![
            ("db", "pubmed"),
            ("term", term),
            ("retmax", retmax.as_str()),
            ("retmode", "json"),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(self.name(), self.timeout, e))?;
        let data = read_json(self.name(), response).await?;
        parse_id_list(&data).ok_or_else(|| malformed(self.name(), "missing esearchresult.idlist"))
    }

    async fn fetch_articles(&self, ids: &[String]) -> Result<String, SourceError> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        let joined = ids.join(",");
        let mut params = vec![("db", "pubmed"), ("id", joined.as_str()), ("retmode", "xml")];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(self.name(), self.timeout, e))?;
        read_text(self.name(), response).await
    }
}

/// `esearchresult.idlist` from an esearch JSON response.
pub fn parse_id_list(data: &serde_json::Value) -> Option<Vec<String>> {
    let ids = data.pointer("/esearchresult/idlist")?.as_array()?;
    Some(
        ids.iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect(),
    )
}

/// efetch XML patterns, compiled once.
struct ArticlePatterns {
    article: Regex,
    pmid: Regex,
    title: Regex,
    journal: Regex,
    year: Regex,
    abstract_text: Regex,
    tag: Regex,
}

static PATTERNS: LazyLock<Option<ArticlePatterns>> = LazyLock::new(|| {
    Some(ArticlePatterns {
        article: Regex::new(r"(?s)<PubmedArticle>(.*?)</PubmedArticle>").ok()?,
        pmid: Regex::new(r"<PMID[^>]*>(\d+)</PMID>").ok()?,
        title: Regex::new(r"(?s)<ArticleTitle[^>]*>(.*?)</ArticleTitle>").ok()?,
        journal: Regex::new(r"(?s)<Journal>.*?<Title>(.*?)</Title>").ok()?,
        year: Regex::new(r"(?s)<PubDate>.*?<Year>(\d{4})</Year>").ok()?,
        abstract_text: Regex::new(r"(?s)<AbstractText[^>]*>(.*?)</AbstractText>").ok()?,
        tag: Regex::new(r"<[^>]+>").ok()?,
    })
});

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Parse `PubmedArticle` elements out of an efetch XML document.
pub fn parse_articles(xml: &str) -> Vec<Paper> {
    let Some(p) = PATTERNS.as_ref() else {
        return Vec::new();
    };
    let strip_tags = |text: &str| p.tag.replace_all(text, "").trim().to_string();

    p.article
        .captures_iter(xml)
        .filter_map(|caps| {
            let body = caps.get(1)?.as_str();
            let id = first_capture(&p.pmid, body)?;
            let title = first_capture(&p.title, body)
                .map(|t| truncate(&strip_tags(&t), TITLE_CHARS))
                .unwrap_or_default();
            let journal = first_capture(&p.journal, body).unwrap_or_default();
            let pub_year = first_capture(&p.year, body).and_then(|y| y.parse().ok());
            let abstract_text = first_capture(&p.abstract_text, body)
                .map(|a| truncate(&strip_tags(&a), ABSTRACT_CHARS))
                .unwrap_or_default();

            Some(Paper {
                url: format!("https://pubmed.ncbi.nlm.nih.gov/{id}/"),
                id,
                title,
                abstract_text,
                journal,
                pub_year,
            })
        })
        .collect()
}

#[async_trait]
impl LiteratureSearch for PubMedSearch {
    fn name(&self) -> &str {
        "pubmed"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>, SourceError> {
        let term = match &self.translator {
            Some(translator) if !query.is_ascii() => {
                let translated = translator.translate(query).await;
                debug!(query, translated = %translated, "Translated literature query");
                translated
            }
            _ => query.to_string(),
        };

        let ids = self.search_ids(&term, max_results).await?;
        if ids.is_empty() {
            info!(term = %term, "No literature hits");
            return Ok(Vec::new());
        }

        let xml = self.fetch_articles(&ids).await?;
        Ok(parse_articles(&xml))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">12345678</PMID>
    <Article>
      <Journal><JournalIssue><PubDate><Year>2021</Year></PubDate></JournalIssue>
        <Title>Journal of Pain Research</Title></Journal>
      <ArticleTitle>Acetaminophen <i>efficacy</i> in tension headache</ArticleTitle>
      <Abstract><AbstractText Label="BACKGROUND">Acetaminophen is widely used.</AbstractText></Abstract>
    </Article>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation><PMID Version="1">87654321</PMID>
    <Article><ArticleTitle>No abstract here</ArticleTitle></Article>
  </MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn article_patterns_compile() {
        assert!(PATTERNS.is_some());
    }

    #[test]
    fn parses_articles() {
        let papers = parse_articles(SAMPLE);
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].id, "12345678");
        assert_eq!(papers[0].title, "Acetaminophen efficacy in tension headache");
        assert_eq!(papers[0].journal, "Journal of Pain Research");
        assert_eq!(papers[0].pub_year, Some(2021));
        assert_eq!(papers[0].abstract_text, "Acetaminophen is widely used.");
        assert_eq!(papers[0].url, "https://pubmed.ncbi.nlm.nih.gov/12345678/");
        assert!(papers[1].abstract_text.is_empty());
        assert_eq!(papers[1].pub_year, None);
    }

    #[test]
    fn long_abstracts_are_capped() {
        let long = "a".repeat(900);
        let xml = format!(
            "<PubmedArticle><PMID>1</PMID><ArticleTitle>t</ArticleTitle><AbstractText>{long}</AbstractText></PubmedArticle>"
        );
        assert_eq!(parse_articles(&xml)[0].abstract_text.len(), ABSTRACT_CHARS);
    }

    #[test]
    fn id_list_parsing() {
        let data = json!({"esearchresult": {"count": "2", "idlist": ["1", "2"]}});
        assert_eq!(parse_id_list(&data), Some(vec!["1".to_string(), "2".to_string()]));
        assert_eq!(parse_id_list(&json!({"error": "bad"})), None);
    }

    #[test]
    fn garbage_xml_yields_nothing() {
        assert!(parse_articles("not xml at all").is_empty());
    }
}
