use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{DeliveryError, TransportError};
use super::signature::{format_signature_header, SIGNATURE_HEADER};
use super::store::DeliveryFailureStore;
use super::transport::{WebhookRequest, WebhookTransport};
use super::types::{DeliveryFailureRecord, WebhookPayload};
use crate::generation::BatchResult;
use crate::metrics;
use crate::signing::SigningKey;

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub enabled: bool,
    /// Used when a batch has no callback URL of its own.
    pub default_url: Option<String>,
    /// Wait before each retry. The first attempt is immediate, so a batch
    /// gets `1 + retry_delays.len()` attempts.
    pub retry_delays: Vec<Duration>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_url: None,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(15),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    /// Every attempt failed; the notification was stored for redrive.
    Persisted { record_id: String, attempts: u32 },
    /// No webhook target; the result is only available by polling.
    Skipped,
}

/// Sends signed batch notifications with retry and durable fallback.
pub struct DeliveryNotifier {
    settings: DeliverySettings,
    key: SigningKey,
    transport: Arc<dyn WebhookTransport>,
    failures: Arc<dyn DeliveryFailureStore>,
}

impl DeliveryNotifier {
    pub fn new(
        settings: DeliverySettings,
        key: SigningKey,
        transport: Arc<dyn WebhookTransport>,
        failures: Arc<dyn DeliveryFailureStore>,
    ) -> Self {
        Self {
            settings,
            key,
            transport,
            failures,
        }
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Deliver a finished batch's result.
    ///
    /// Returns `Persisted` when every attempt failed and the notification was
    /// stored. An error means the record could not be stored either.
    pub async fn deliver(
        &self,
        job_id: &str,
        result: BatchResult,
        callback_url: Option<&str>,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let batch_id = result.batch_id.clone();
        let Some(url) = self.target_url(callback_url) else {
            info!(batch_id = %batch_id, "No webhook target, result available via status query");
            metrics::WEBHOOK_DELIVERIES
                .with_label_values(&["skipped"])
                .inc();
            return Ok(DeliveryOutcome::Skipped);
        };

        let payload = WebhookPayload::signed(&self.key, job_id, result, Utc::now())?;
        let request = self.build_request(&url, &payload)?;

        let max_attempts = 1 + self.settings.retry_delays.len() as u32;
        let mut attempts = 0;
        let mut last_error: Option<TransportError> = None;
        while attempts < max_attempts {
            attempts += 1;
            match self.transport.send(&request).await {
                Ok(status) => {
                    metrics::WEBHOOK_DELIVERIES
                        .with_label_values(&["delivered"])
                        .inc();
                    info!(batch_id = %batch_id, url = %url, status, attempts, "Batch result delivered");
                    return Ok(DeliveryOutcome::Delivered { attempts });
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        batch_id = %batch_id,
                        url = %url,
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "Webhook delivery failed"
                    );
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                    if let Some(delay) = self.settings.retry_delays.get(attempts as usize - 1) {
                        tokio::time::sleep(*delay).await;
                    }
                }
            }
        }

        self.store_failure(
            &batch_id,
            url,
            &request,
            last_error.map(|e| e.to_string()).unwrap_or_default(),
            attempts,
        )
    }

    /// Persist a notification whose delivery never ran to completion, so it
    /// can be redriven later. Used when shutdown interrupts delivery.
    pub fn persist_pending(
        &self,
        job_id: &str,
        result: BatchResult,
        callback_url: Option<&str>,
        reason: &str,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let batch_id = result.batch_id.clone();
        let Some(url) = self.target_url(callback_url) else {
            return Ok(DeliveryOutcome::Skipped);
        };
        let payload = WebhookPayload::signed(&self.key, job_id, result, Utc::now())?;
        let request = self.build_request(&url, &payload)?;
        self.store_failure(&batch_id, url, &request, reason.to_string(), 0)
    }

    fn target_url(&self, callback_url: Option<&str>) -> Option<String> {
        callback_url
            .map(str::to_string)
            .or_else(|| self.settings.default_url.clone())
            .filter(|_| self.settings.enabled)
    }

    fn store_failure(
        &self,
        batch_id: &str,
        url: String,
        request: &WebhookRequest,
        last_error: String,
        attempts: u32,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let record = DeliveryFailureRecord {
            id: Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            target_url: url,
            payload: String::from_utf8_lossy(&request.body).into_owned(),
            last_error,
            attempts,
            created_at: Utc::now(),
            resolved_at: None,
        };
        metrics::WEBHOOK_DELIVERIES
            .with_label_values(&["persisted"])
            .inc();

        if let Err(e) = self.failures.record(&record) {
            error!(
                batch_id = %batch_id,
                error = %e,
                payload = %record.payload,
                "Failed to persist undeliverable batch result"
            );
            return Err(e.into());
        }

        error!(
            batch_id = %batch_id,
            record_id = %record.id,
            attempts,
            "Webhook delivery not completed, result persisted for redrive"
        );
        Ok(DeliveryOutcome::Persisted {
            record_id: record.id,
            attempts,
        })
    }

    fn build_request(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<WebhookRequest, DeliveryError> {
        let body = serde_json::to_vec(payload)?;
        Ok(WebhookRequest {
            url: url.to_string(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    SIGNATURE_HEADER.to_string(),
                    format_signature_header(&self.key, &body),
                ),
                ("X-Ticketgen-Event".to_string(), payload.event_type.clone()),
            ],
            body,
        })
    }

    pub fn list_failures(&self) -> Result<Vec<DeliveryFailureRecord>, DeliveryError> {
        Ok(self.failures.list_unresolved()?)
    }

    /// Retry a persisted notification once. Marks it resolved on success.
    pub async fn redeliver(&self, record_id: &str) -> Result<DeliveryOutcome, DeliveryError> {
        let record = self
            .failures
            .get(record_id)?
            .ok_or_else(|| super::error::DeliveryStoreError::NotFound(record_id.to_string()))?;
        if record.resolved_at.is_some() {
            return Err(DeliveryError::AlreadyResolved(record_id.to_string()));
        }

        let body = record.payload.into_bytes();
        let request = WebhookRequest {
            url: record.target_url.clone(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (
                    SIGNATURE_HEADER.to_string(),
                    format_signature_header(&self.key, &body),
                ),
            ],
            body,
        };

        let attempts = record.attempts + 1;
        match self.transport.send(&request).await {
            Ok(_) => {
                self.failures.mark_resolved(record_id, Utc::now())?;
                metrics::WEBHOOK_DELIVERIES
                    .with_label_values(&["redelivered"])
                    .inc();
                info!(record_id = %record_id, batch_id = %record.batch_id, "Persisted batch result redelivered");
                Ok(DeliveryOutcome::Delivered { attempts })
            }
            Err(e) => {
                self.failures
                    .record_attempt(record_id, &e.to_string(), attempts)?;
                warn!(record_id = %record_id, error = %e, "Redelivery failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{verify_webhook, SqliteDeliveryFailureStore};
    use crate::generation::TicketOutcome;
    use crate::testing::MockWebhookTransport;

    fn settings(retries: usize) -> DeliverySettings {
        DeliverySettings {
            enabled: true,
            default_url: Some("https://requester.test/hook".to_string()),
            retry_delays: vec![Duration::from_millis(1); retries],
        }
    }

    fn notifier(
        settings: DeliverySettings,
        transport: Arc<MockWebhookTransport>,
    ) -> (DeliveryNotifier, Arc<SqliteDeliveryFailureStore>) {
        let store = Arc::new(SqliteDeliveryFailureStore::in_memory().unwrap());
        let notifier = DeliveryNotifier::new(
            settings,
            SigningKey::new("hook-secret"),
            transport,
            store.clone(),
        );
        (notifier, store)
    }

    fn result() -> BatchResult {
        let ok = TicketOutcome {
            success: true,
            error_message: None,
            ..TicketOutcome::failed("t1", "")
        };
        BatchResult::from_outcomes("b1", vec![ok], 10)
    }

    #[tokio::test]
    async fn test_delivers_signed_payload() {
        let transport = Arc::new(MockWebhookTransport::new());
        let (notifier, _store) = notifier(settings(3), transport.clone());

        let outcome = notifier.deliver("job-1", result(), None).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 1 });

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        let request = &sent[0];
        assert_eq!(request.url, "https://requester.test/hook");
        let header = request.header(SIGNATURE_HEADER).unwrap();
        assert!(verify_webhook(&request.body, header, b"hook-secret"));

        let payload: WebhookPayload = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(payload.batch_id, "b1");
        assert_eq!(payload.job_id, "job-1");
        assert_eq!(payload.event_type, "batch.completed");
        assert!(payload.verify(&SigningKey::new("hook-secret")));
    }

    #[tokio::test]
    async fn test_callback_url_overrides_default() {
        let transport = Arc::new(MockWebhookTransport::new());
        let (notifier, _store) = notifier(settings(0), transport.clone());

        notifier
            .deliver("job-1", result(), Some("https://other.test/cb"))
            .await
            .unwrap();
        assert_eq!(transport.requests()[0].url, "https://other.test/cb");
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let transport = Arc::new(MockWebhookTransport::new());
        transport.fail_next(2);
        let (notifier, store) = notifier(settings(3), transport.clone());

        let outcome = notifier.deliver("job-1", result(), None).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 3 });
        assert!(store.list_unresolved().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_persist_record() {
        let transport = Arc::new(MockWebhookTransport::new());
        transport.fail_always(true);
        let (notifier, store) = notifier(settings(3), transport.clone());

        let outcome = notifier.deliver("job-1", result(), None).await.unwrap();
        let DeliveryOutcome::Persisted { record_id, attempts } = outcome else {
            panic!("expected persisted outcome, got {outcome:?}");
        };
        assert_eq!(attempts, 4);
        assert_eq!(transport.requests().len(), 4);

        let records = store.list_unresolved().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record_id);
        assert_eq!(records[0].batch_id, "b1");
        assert_eq!(records[0].attempts, 4);
        let persisted: WebhookPayload = serde_json::from_str(&records[0].payload).unwrap();
        assert_eq!(persisted.data.total, 1);
        assert!(persisted.verify(&SigningKey::new("hook-secret")));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_early() {
        let transport = Arc::new(MockWebhookTransport::new());
        transport.fail_with_status(410);
        let (notifier, store) = notifier(settings(3), transport.clone());

        let outcome = notifier.deliver("job-1", result(), None).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Persisted { attempts: 1, .. }));
        assert_eq!(store.list_unresolved().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_skipped_without_target() {
        let transport = Arc::new(MockWebhookTransport::new());
        let (notifier, _store) = notifier(
            DeliverySettings {
                default_url: None,
                ..settings(0)
            },
            transport.clone(),
        );

        let outcome = notifier.deliver("job-1", result(), None).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Skipped);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_redeliver_resolves_record() {
        let transport = Arc::new(MockWebhookTransport::new());
        transport.fail_always(true);
        let (notifier, store) = notifier(settings(1), transport.clone());

        let DeliveryOutcome::Persisted { record_id, .. } =
            notifier.deliver("job-1", result(), None).await.unwrap()
        else {
            panic!("expected persisted outcome");
        };

        // Still failing: attempt counted, record stays open.
        assert!(notifier.redeliver(&record_id).await.is_err());
        assert_eq!(store.get(&record_id).unwrap().unwrap().attempts, 3);

        transport.fail_always(false);
        let outcome = notifier.redeliver(&record_id).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 4 });
        assert!(notifier.list_failures().unwrap().is_empty());

        let last = transport.requests().pop().unwrap();
        assert!(verify_webhook(
            &last.body,
            last.header(SIGNATURE_HEADER).unwrap(),
            b"hook-secret"
        ));
        assert!(matches!(
            notifier.redeliver(&record_id).await,
            Err(DeliveryError::AlreadyResolved(_))
        ));
    }
}
