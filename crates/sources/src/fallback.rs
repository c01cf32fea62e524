//! Generator chain: the configured generative endpoints tried in order.
//!
//! A link is abandoned and the next one tried when it errors, exceeds its
//! own timeout, or answers with something that is not the requested shape.
//! Only when every link has been abandoned does the chain fail, and the
//! error then lists what happened at each link.

use async_trait::async_trait;
use remedium_config::GenerativeEndpoint;
use remedium_core::error::SourceError;
use remedium_core::source::GenerativeClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ordered generators, each with its own deadline.
pub struct GeneratorChain {
    name: String,
    links: Vec<Link>,
}

struct Link {
    generator: Arc<dyn GenerativeClient>,
    timeout: Duration,
}

/// Why a link was abandoned.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkFailure {
    Failed(String),
    TimedOut(Duration),
    OffSchema(String),
}

impl fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "{reason}"),
            Self::TimedOut(after) => write!(f, "no answer within {}s", after.as_secs_f32()),
            Self::OffSchema(reason) => write!(f, "answer off schema ({reason})"),
        }
    }
}

impl GeneratorChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: Vec::new(),
        }
    }

    pub fn link(mut self, generator: Arc<dyn GenerativeClient>, timeout: Duration) -> Self {
        self.links.push(Link { generator, timeout });
        self
    }

    /// Append a generator using the timeout configured for its endpoint.
    pub fn link_endpoint(self, generator: Arc<dyn GenerativeClient>, endpoint: &GenerativeEndpoint) -> Self {
        self.link(generator, Duration::from_secs(endpoint.timeout_secs.max(1)))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.links.iter().map(|l| l.timeout).collect()
    }

    async fn attempt(&self, link: &Link, prompt: &str, schema: &str) -> Result<serde_json::Value, LinkFailure> {
        let answer = tokio::time::timeout(link.timeout, link.generator.generate(prompt, schema))
            .await
            .map_err(|_| LinkFailure::TimedOut(link.timeout))?
            .map_err(|e| match e {
                SourceError::Malformed { reason, .. } => LinkFailure::OffSchema(reason),
                other => LinkFailure::Failed(other.to_string()),
            })?;
        check_shape(&answer, schema).map_err(LinkFailure::OffSchema)?;
        Ok(answer)
    }
}

/// The answer must be a JSON object. When the schema is itself a JSON object,
/// the answer must also carry at least one of its top-level fields.
pub fn check_shape(answer: &serde_json::Value, schema: &str) -> Result<(), String> {
    let Some(fields) = answer.as_object() else {
        return Err(format!("expected an object, got {}", kind_of(answer)));
    };
    let expected = match serde_json::from_str::<serde_json::Value>(schema) {
        Ok(serde_json::Value::Object(shape)) if !shape.is_empty() => shape,
        _ => return Ok(()),
    };
    if expected.keys().any(|k| fields.contains_key(k)) {
        Ok(())
    } else {
        let wanted: Vec<&str> = expected.keys().map(String::as_str).collect();
        Err(format!("none of the fields {}", wanted.join(", ")))
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[async_trait]
impl GenerativeClient for GeneratorChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, schema: &str) -> Result<serde_json::Value, SourceError> {
        if self.links.is_empty() {
            return Err(SourceError::NotConfigured(format!(
                "{}: no generative endpoint has an API key",
                self.name
            )));
        }

        let mut abandoned = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let generator = link.generator.name();
            match self.attempt(link, prompt, schema).await {
                Ok(answer) => {
                    debug!(chain = %self.name, generator, skipped = abandoned.len(), "Generator answered");
                    return Ok(answer);
                }
                Err(failure) => {
                    warn!(chain = %self.name, generator, %failure, "Generator abandoned");
                    abandoned.push(format!("{generator}: {failure}"));
                }
            }
        }

        info!(chain = %self.name, links = abandoned.len(), "Generator chain exhausted");
        Err(SourceError::Unavailable {
            source_name: self.name.clone(),
            reason: format!("every generator failed [{}]", abandoned.join("; ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    enum Reply {
        Answer(serde_json::Value),
        Fail(SourceError),
        Hang,
    }

    struct ScriptedLink {
        name: &'static str,
        reply: Reply,
        call_count: Mutex<usize>,
    }

    impl ScriptedLink {
        fn new(name: &'static str, reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                call_count: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedLink {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _: &str, _: &str) -> Result<serde_json::Value, SourceError> {
            *self.call_count.lock().unwrap() += 1;
            match &self.reply {
                Reply::Answer(value) => Ok(value.clone()),
                Reply::Fail(e) => Err(e.clone()),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(SourceError::Network("woke up".into()))
                }
            }
        }
    }

    const PLAN: &str = r#"{"summary": "text", "ingredients": []}"#;
    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn healthy_primary_answers_alone() {
        let primary = ScriptedLink::new("primary", Reply::Answer(json!({"summary": "rest"})));
        let secondary = ScriptedLink::new("secondary", Reply::Answer(json!({"summary": "other"})));
        let chain = GeneratorChain::new("generative")
            .link(primary.clone(), SECOND)
            .link(secondary.clone(), SECOND);

        let answer = chain.generate("prompt", PLAN).await.unwrap();
        assert_eq!(answer["summary"], "rest");
        assert_eq!((primary.calls(), secondary.calls()), (1, 0));
    }

    #[tokio::test]
    async fn invalid_json_from_a_link_moves_on() {
        let primary = ScriptedLink::new(
            "primary",
            Reply::Fail(SourceError::Malformed {
                source_name: "primary".into(),
                reason: "expected value at line 1".into(),
            }),
        );
        let secondary = ScriptedLink::new("secondary", Reply::Answer(json!({"summary": "ok"})));
        let chain = GeneratorChain::new("generative")
            .link(primary.clone(), SECOND)
            .link(secondary.clone(), SECOND);

        assert_eq!(chain.generate("p", PLAN).await.unwrap()["summary"], "ok");
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn non_object_answer_moves_on() {
        let primary = ScriptedLink::new("primary", Reply::Answer(json!(["a list"])));
        let secondary = ScriptedLink::new("secondary", Reply::Answer(json!({"ingredients": []})));
        let chain = GeneratorChain::new("generative")
            .link(primary.clone(), SECOND)
            .link(secondary.clone(), SECOND);

        assert!(chain.generate("p", PLAN).await.is_ok());
        assert_eq!((primary.calls(), secondary.calls()), (1, 1));
    }

    #[tokio::test]
    async fn answer_without_any_schema_field_moves_on() {
        let primary = ScriptedLink::new("primary", Reply::Answer(json!({"reply": "I cannot help"})));
        let secondary = ScriptedLink::new("secondary", Reply::Answer(json!({"summary": "ok"})));
        let chain = GeneratorChain::new("generative")
            .link(primary, SECOND)
            .link(secondary.clone(), SECOND);

        assert_eq!(chain.generate("p", PLAN).await.unwrap()["summary"], "ok");
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_link_is_cut_at_its_own_timeout() {
        let slow = ScriptedLink::new("slow", Reply::Hang);
        let fallback = ScriptedLink::new("fallback", Reply::Answer(json!({"summary": "late but fine"})));
        let chain = GeneratorChain::new("generative")
            .link(slow.clone(), Duration::from_secs(30))
            .link(fallback.clone(), Duration::from_secs(45));

        let started = tokio::time::Instant::now();
        assert!(chain.generate("p", PLAN).await.is_ok());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31));
        assert_eq!(fallback.calls(), 1);
    }

    #[test]
    fn endpoint_timeout_comes_from_config() {
        let endpoint = |secs| GenerativeEndpoint {
            name: "primary".into(),
            api_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            timeout_secs: secs,
        };
        let link = ScriptedLink::new("primary", Reply::Answer(json!({})));
        let chain = GeneratorChain::new("generative")
            .link_endpoint(link.clone(), &endpoint(45))
            .link_endpoint(link, &endpoint(0));
        assert_eq!(chain.timeouts(), vec![Duration::from_secs(45), Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_every_link() {
        let chain = GeneratorChain::new("generative")
            .link(
                ScriptedLink::new("primary", Reply::Fail(SourceError::Network("connection refused".into()))),
                SECOND,
            )
            .link(ScriptedLink::new("secondary", Reply::Hang), Duration::from_secs(2))
            .link(ScriptedLink::new("tertiary", Reply::Answer(json!("plain text"))), SECOND);

        match chain.generate("p", PLAN).await.unwrap_err() {
            SourceError::Unavailable { source_name, reason } => {
                assert_eq!(source_name, "generative");
                assert!(reason.contains("primary: Network error: connection refused"));
                assert!(reason.contains("secondary: no answer within 2s"));
                assert!(reason.contains("tertiary: answer off schema (expected an object, got a string)"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chain_without_links_is_not_configured() {
        let chain = GeneratorChain::new("generative");
        assert!(chain.is_empty());
        assert!(matches!(
            chain.generate("p", PLAN).await,
            Err(SourceError::NotConfigured(_))
        ));
    }

    #[test]
    fn free_text_schema_only_requires_an_object() {
        assert!(check_shape(&json!({"anything": 1}), "a short answer").is_ok());
        assert!(check_shape(&json!(null), "a short answer").is_err());
        assert!(check_shape(&json!({"caution": ""}), r#"{"efficacy": "", "caution": ""}"#).is_ok());
    }
}
