//! Shared HTTP plumbing for the source clients.

use remedium_core::error::SourceError;
use std::time::Duration;
use tracing::warn;

/// Map a transport failure to a `SourceError`, keeping timeouts distinct.
pub(crate) fn send_error(source_name: &str, timeout: Duration, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout {
            source_name: source_name.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        SourceError::Network(format!("{source_name}: {e}"))
    }
}

/// Check the status and decode a JSON body.
pub(crate) async fn read_json(
    source_name: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, SourceError> {
    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(source = source_name, status, body = %truncate(&body, 200), "Source returned error");
        return Err(SourceError::ApiError {
            status_code: status,
            message: body,
        });
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| malformed(source_name, format!("invalid JSON body: {e}")))
}

/// Check the status and return the body as text.
pub(crate) async fn read_text(
    source_name: &str,
    response: reqwest::Response,
) -> Result<String, SourceError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| SourceError::Network(format!("{source_name}: {e}")))?;
    if !(200..300).contains(&status) {
        warn!(source = source_name, status, "Source returned error");
        return Err(SourceError::ApiError {
            status_code: status,
            message: body,
        });
    }
    Ok(body)
}

pub(crate) fn malformed(source_name: &str, reason: impl Into<String>) -> SourceError {
    SourceError::Malformed {
        source_name: source_name.to_string(),
        reason: reason.into(),
    }
}

/// String field of a JSON object; missing or null reads as empty.
pub(crate) fn str_field(item: &serde_json::Value, key: &str) -> String {
    match item.get(key) {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Truncate to at most `max_chars` characters (not bytes).
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
