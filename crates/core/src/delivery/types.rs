use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generation::{BatchResult, BatchStatus};
use crate::signing::SigningKey;

/// Notification body sent to the requester.
///
/// `signature` is HMAC-SHA256 over the canonical JSON of the other fields,
/// computed the same way as ticket token signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event_type: String,
    pub batch_id: String,
    pub job_id: String,
    pub status: BatchStatus,
    pub timestamp: DateTime<Utc>,
    pub data: BatchResult,
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnsignedPayload<'a> {
    event_type: &'a str,
    batch_id: &'a str,
    job_id: &'a str,
    status: BatchStatus,
    timestamp: &'a DateTime<Utc>,
    data: &'a BatchResult,
}

impl WebhookPayload {
    /// Build and sign a notification for a finished batch.
    pub fn signed(
        key: &SigningKey,
        job_id: impl Into<String>,
        result: BatchResult,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let status = result.status();
        let mut payload = Self {
            event_type: format!("batch.{}", status.as_str()),
            batch_id: result.batch_id.clone(),
            job_id: job_id.into(),
            status,
            timestamp,
            data: result,
            signature: String::new(),
        };
        payload.signature = key.sign_json(&payload.unsigned())?;
        Ok(payload)
    }

    fn unsigned(&self) -> UnsignedPayload<'_> {
        UnsignedPayload {
            event_type: &self.event_type,
            batch_id: &self.batch_id,
            job_id: &self.job_id,
            status: self.status,
            timestamp: &self.timestamp,
            data: &self.data,
        }
    }

    /// Check the embedded signature.
    pub fn verify(&self, key: &SigningKey) -> bool {
        key.verify_json(&self.unsigned(), &self.signature)
    }
}

/// A notification that could not be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailureRecord {
    pub id: String,
    pub batch_id: String,
    pub target_url: String,
    /// Exact request body that was sent.
    pub payload: String,
    pub last_error: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
