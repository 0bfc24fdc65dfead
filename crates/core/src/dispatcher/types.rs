use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delivery::DeliveryOutcome;
use crate::generation::{BatchResult, BatchStatus, GenerationMode, RendererOptions};
use crate::token::TicketData;

/// A batch submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub tickets: Vec<TicketData>,
    /// Event metadata passed to the document renderer.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub event: Value,
    /// User metadata keyed by user id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub users: HashMap<String, Value>,
    #[serde(default)]
    pub options: BatchOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default)]
    pub mode: GenerationMode,
    /// One of `critical`, `high`, `normal`, `low`. Anything else is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Delay before the jobs become eligible, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub renderer_options: RendererOptions,
    /// Overrides the configured webhook URL for this batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Response to a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmission {
    /// First job of the batch.
    pub job_id: String,
    pub batch_id: String,
    pub job_ids: Vec<String>,
    /// A hint, not a guarantee.
    pub estimated_duration_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Processing,
    Completed,
    Partial,
    Failed,
}

impl From<BatchStatus> for BatchState {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Completed => BatchState::Completed,
            BatchStatus::Partial => BatchState::Partial,
            BatchStatus::Failed => BatchState::Failed,
        }
    }
}

/// Batch status as reported to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub batch_id: String,
    pub state: BatchState,
    pub total_tickets: usize,
    pub jobs_total: usize,
    pub jobs_finished: usize,
    pub job_ids: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcomes merged so far; the final result once finished.
    pub result: BatchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryOutcome>,
}
