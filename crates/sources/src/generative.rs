//! OpenAI-compatible chat-completions client returning structured JSON.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions`. The schema description goes into the system message
//! and the model is asked for `response_format: json_object`.

use async_trait::async_trait;
use remedium_core::error::SourceError;
use remedium_core::source::GenerativeClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::http::{malformed, send_error};

pub struct OpenAiJsonClient {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiJsonClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
            timeout: Duration::from_secs(30),
            client,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn system_prompt(schema: &str) -> String {
        format!(
            "You are a careful health information assistant. \
             Respond ONLY with a single JSON object matching this shape:\n{schema}"
        )
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

/// Pull the outermost `{...}` out of a model answer.
///
/// Tolerates Markdown code fences and prose around the object.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(value @ serde_json::Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[async_trait]
impl GenerativeClient for OpenAiJsonClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        schema: &str,
    ) -> Result<serde_json::Value, SourceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ApiRequest {
            model: &self.model,
            messages: vec![
                ApiMessage {
                    role: "system".into(),
                    content: Some(Self::system_prompt(schema)),
                },
                ApiMessage {
                    role: "user".into(),
                    content: Some(prompt.to_string()),
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        debug!(provider = %self.name, model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| send_error(&self.name, self.timeout, e))?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(SourceError::Unavailable {
                source_name: self.name.clone(),
                reason: "Invalid API key or insufficient permissions".into(),
            });
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(SourceError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| malformed(&self.name, format!("Failed to parse response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| malformed(&self.name, "No choices in response"))?;

        extract_json_object(&content)
            .ok_or_else(|| malformed(&self.name, "answer is not a JSON object"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object() {
        let value = extract_json_object(r#"{"condition": "indigestion"}"#).unwrap();
        assert_eq!(value["condition"], "indigestion");
    }

    #[test]
    fn fenced_object_with_prose() {
        let text = "Here you go:\n```json\n{\"ingredients\": [{\"name\": \"ginger\"}]}\n```\nStay well.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["ingredients"][0]["name"], "ginger");
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
        assert!(extract_json_object("{broken").is_none());
    }

    #[test]
    fn request_shape() {
        let body = ApiRequest {
            model: "gpt-4o-mini",
            messages: vec![ApiMessage {
                role: "user".into(),
                content: Some("hi".into()),
            }],
            temperature: 0.3,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn system_prompt_carries_schema() {
        let prompt = OpenAiJsonClient::system_prompt(r#"{"condition": "string"}"#);
        assert!(prompt.contains(r#"{"condition": "string"}"#));
    }
}
