use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::render::{ArtifactRef, QrRenderOptions};
use crate::token::{SignedTicketToken, TicketData};

/// Renderer settings carried in a batch request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererOptions {
    #[serde(default)]
    pub qr: QrRenderOptions,
    /// Document template reference. `None` uses the renderer's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Passed through to the document renderer.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub document: Value,
}

/// Payload of a generation job: one chunk of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketBatchPayload {
    pub batch_id: String,
    #[serde(default)]
    pub chunk_index: usize,
    pub tickets: Vec<TicketData>,
    /// Event metadata for documents.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub event: Value,
    /// User metadata for documents, keyed by user id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub users: HashMap<String, Value>,
    #[serde(default)]
    pub renderer_options: RendererOptions,
}

/// Result for a single ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SignedTicketToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Document failure for a ticket whose QR artifact was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_error: Option<String>,
    /// Whether the failure might succeed on retry. Not serialized.
    #[serde(skip)]
    pub retryable: bool,
}

impl TicketOutcome {
    pub fn failed(ticket_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            success: false,
            token: None,
            qr_artifact: None,
            document_artifact: None,
            error_message: Some(message.into()),
            document_error: None,
            retryable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Completed,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "completed",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
        }
    }
}

/// Aggregate outcome of a batch (or of one job's chunk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub processing_time_ms: u64,
    pub outcomes: Vec<TicketOutcome>,
}

impl BatchResult {
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            total: 0,
            successful: 0,
            failed: 0,
            processing_time_ms: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn from_outcomes(
        batch_id: impl Into<String>,
        outcomes: Vec<TicketOutcome>,
        processing_time_ms: u64,
    ) -> Self {
        let mut result = Self::new(batch_id);
        result.processing_time_ms = processing_time_ms;
        for outcome in outcomes {
            result.push(outcome);
        }
        result
    }

    pub fn push(&mut self, outcome: TicketOutcome) {
        self.total += 1;
        if outcome.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Fold another chunk's outcomes into this result.
    pub fn merge(&mut self, other: BatchResult) {
        self.processing_time_ms += other.processing_time_ms;
        for outcome in other.outcomes {
            self.push(outcome);
        }
    }

    pub fn status(&self) -> BatchStatus {
        if self.failed == 0 {
            BatchStatus::Completed
        } else if self.successful == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(id: &str) -> TicketOutcome {
        TicketOutcome {
            success: true,
            error_message: None,
            ..TicketOutcome::failed(id, "")
        }
    }

    #[test]
    fn test_counts_and_status() {
        let result = BatchResult::from_outcomes(
            "b1",
            vec![ok("t1"), TicketOutcome::failed("t2", "boom"), ok("t3")],
            12,
        );
        assert_eq!(result.total, 3);
        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.status(), BatchStatus::Partial);

        assert_eq!(BatchResult::from_outcomes("b", vec![ok("a")], 0).status(), BatchStatus::Completed);
        assert_eq!(
            BatchResult::from_outcomes("b", vec![TicketOutcome::failed("a", "x")], 0).status(),
            BatchStatus::Failed
        );
    }

    #[test]
    fn test_merge_chunks() {
        let mut result = BatchResult::from_outcomes("b1", vec![ok("t1")], 5);
        result.merge(BatchResult::from_outcomes("b1", vec![TicketOutcome::failed("t2", "x")], 7));
        assert_eq!(result.total, 2);
        assert_eq!(result.processing_time_ms, 12);
        assert_eq!(result.outcomes[1].ticket_id, "t2");
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = BatchResult::from_outcomes("b1", vec![TicketOutcome::failed("t1", "boom")], 3);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["batchId"], "b1");
        assert_eq!(json["processingTimeMs"], 3);
        assert_eq!(json["outcomes"][0]["ticketId"], "t1");
        assert_eq!(json["outcomes"][0]["errorMessage"], "boom");
        assert!(json["outcomes"][0].get("retryable").is_none());
    }

    #[test]
    fn test_payload_defaults() {
        let payload: TicketBatchPayload = serde_json::from_str(
            r#"{"batchId":"b1","tickets":[{"id":"t1","eventId":"e1","userId":"u1"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.chunk_index, 0);
        assert!(payload.event.is_null());
        assert_eq!(payload.renderer_options.qr.size, 300);
    }
}
