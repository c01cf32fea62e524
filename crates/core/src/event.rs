//! Progress events for the streamed analysis.
//!
//! `ProgressEvent` is what the streaming orchestrator sends to its caller:
//! - `progress`: a numbered stage started
//! - `result`  : the finished report (sent exactly once on success)
//! - `error`   : the report could not be built

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A stage started. Stages are emitted in increasing order.
    Progress {
        stage: u8,
        message: String,
        progress_percent: u8,
    },

    /// The final report.
    Result { data: serde_json::Value },

    /// The stream ended without a report.
    Error { message: String },
}

impl ProgressEvent {
    pub fn progress(stage: u8, message: impl Into<String>, progress_percent: u8) -> Self {
        Self::Progress {
            stage,
            message: message.into(),
            progress_percent: progress_percent.min(100),
        }
    }

    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}
