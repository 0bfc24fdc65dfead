//! Testing utilities and mock implementations.
//!
//! Mocks for every external collaborator (renderers, artifact storage,
//! webhook transport, nonce store) so the whole pipeline can run in-process.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticketgen_core::testing::{MockQrRenderer, MockWebhookTransport};
//!
//! let qr = MockQrRenderer::new();
//! qr.fail_for("t2");
//!
//! let transport = MockWebhookTransport::new();
//! transport.fail_next(2);
//! ```

mod mock_nonce_store;
mod mock_renderers;
mod mock_webhook;
mod recording_observer;

use std::time::Duration;

pub use mock_nonce_store::UnavailableNonceStore;
pub use mock_renderers::{MemoryArtifactStore, MockDocumentRenderer, MockQrRenderer};
pub use mock_webhook::MockWebhookTransport;
pub use recording_observer::RecordingObserver;

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use serde_json::Value;
    use uuid::Uuid;

    use crate::generation::{RendererOptions, TicketBatchPayload};
    use crate::queue::{BackoffPolicy, Job, JobPriority, JobState, QueueName};
    use crate::token::TicketData;

    /// A ticket for event `e1` owned by `u-<id>`.
    pub fn ticket(id: &str) -> TicketData {
        TicketData::new(id, "e1", format!("u-{id}"))
    }

    /// A waiting job in the ticket-generation queue.
    pub fn job(job_type: &str, payload: Value) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4().to_string(),
            queue: QueueName::TicketGeneration,
            job_type: job_type.to_string(),
            payload,
            priority: JobPriority::Normal,
            state: JobState::Waiting,
            attempts_made: 0,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            stalled_count: 0,
            created_at: now,
            available_at: now,
            processed_at: None,
            finished_at: None,
            failed_reason: None,
            return_value: None,
            origin: None,
        }
    }

    /// A generation payload with one ticket per id.
    pub fn batch_payload(batch_id: &str, ticket_ids: &[&str]) -> TicketBatchPayload {
        TicketBatchPayload {
            batch_id: batch_id.to_string(),
            chunk_index: 0,
            tickets: ticket_ids.iter().map(|id| ticket(id)).collect(),
            event: serde_json::json!({"name": "Test Event"}),
            users: Default::default(),
            renderer_options: RendererOptions::default(),
        }
    }

    /// A generation job carrying one chunk of a batch.
    pub fn batch_job(batch_id: &str, chunk_index: usize, ticket_ids: &[&str]) -> Job {
        let mut payload = batch_payload(batch_id, ticket_ids);
        payload.chunk_index = chunk_index;
        let payload = serde_json::to_value(&payload).unwrap_or_default();
        job("batch-ticket-generation", payload)
    }
}
