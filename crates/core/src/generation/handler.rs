use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::types::{BatchResult, TicketBatchPayload, TicketOutcome};
use crate::metrics;
use crate::queue::QueueName;
use crate::render::{
    ArtifactRef, ArtifactStore, DocumentRenderer, DocumentRequest, QrRenderer, RenderError,
};
use crate::token::{TicketData, TokenSigner};
use crate::worker::{JobContext, JobError, JobHandler};

/// Template used when a batch does not name one.
const DEFAULT_TEMPLATE: &str = "default";

/// Which artifacts a generation job produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Signed token and QR image.
    #[default]
    QrOnly,
    /// Signed token embedded in a document.
    DocumentOnly,
    /// QR image and document.
    Composite,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 3] = [
        GenerationMode::QrOnly,
        GenerationMode::DocumentOnly,
        GenerationMode::Composite,
    ];

    pub fn job_type(self) -> &'static str {
        match self {
            GenerationMode::QrOnly => "batch-ticket-generation",
            GenerationMode::DocumentOnly => "batch-document-generation",
            GenerationMode::Composite => "composite-batch-generation",
        }
    }

    pub fn queue(self) -> QueueName {
        match self {
            GenerationMode::QrOnly => QueueName::TicketGeneration,
            GenerationMode::DocumentOnly => QueueName::DocumentGeneration,
            GenerationMode::Composite => QueueName::CompositeBatch,
        }
    }

    fn renders_qr(self) -> bool {
        matches!(self, GenerationMode::QrOnly | GenerationMode::Composite)
    }

    fn renders_document(self) -> bool {
        matches!(self, GenerationMode::DocumentOnly | GenerationMode::Composite)
    }
}

/// Handler for the three batch generation job types.
pub struct TicketGenerationHandler {
    mode: GenerationMode,
    signer: TokenSigner,
    qr_renderer: Arc<dyn QrRenderer>,
    document_renderer: Arc<dyn DocumentRenderer>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl TicketGenerationHandler {
    pub fn new(
        mode: GenerationMode,
        signer: TokenSigner,
        qr_renderer: Arc<dyn QrRenderer>,
        document_renderer: Arc<dyn DocumentRenderer>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            mode,
            signer,
            qr_renderer,
            document_renderer,
            artifacts,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    /// Generate one chunk. Cancellation is checked between tickets.
    pub async fn generate(
        &self,
        payload: &TicketBatchPayload,
        ctx: &JobContext,
    ) -> Result<BatchResult, JobError> {
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(payload.tickets.len());

        for ticket in &payload.tickets {
            if ctx.is_cancelled() {
                info!(
                    job_id = %ctx.job().id,
                    batch_id = %payload.batch_id,
                    processed = outcomes.len(),
                    "Generation stopped after cancellation"
                );
                return Err(JobError::Cancelled);
            }
            let outcome = self.process_ticket(payload, ticket).await;
            metrics::TICKETS_GENERATED
                .with_label_values(&[if outcome.success { "success" } else { "failed" }])
                .inc();
            outcomes.push(outcome);
        }

        Ok(BatchResult::from_outcomes(
            payload.batch_id.clone(),
            outcomes,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn process_ticket(&self, payload: &TicketBatchPayload, ticket: &TicketData) -> TicketOutcome {
        let token = match self.signer.sign(ticket) {
            Ok(token) => token,
            Err(e) => return TicketOutcome::failed(ticket.id.clone(), e.to_string()),
        };
        let encoded = match token.encode() {
            Ok(encoded) => encoded,
            Err(e) => return TicketOutcome::failed(ticket.id.clone(), e.to_string()),
        };

        let mut outcome = TicketOutcome {
            ticket_id: ticket.id.clone(),
            success: false,
            token: Some(token),
            qr_artifact: None,
            document_artifact: None,
            error_message: None,
            document_error: None,
            retryable: false,
        };

        if self.mode.renders_qr() {
            match self.render_qr(payload, ticket, &encoded).await {
                Ok(reference) => outcome.qr_artifact = Some(reference),
                Err(e) => {
                    warn!(ticket_id = %ticket.id, error = %e, "QR rendering failed");
                    outcome.retryable = e.is_retryable();
                    outcome.error_message = Some(format!("QR rendering failed: {e}"));
                    return outcome;
                }
            }
        }

        if self.mode.renders_document() {
            match self.render_document(payload, ticket, &encoded).await {
                Ok(reference) => outcome.document_artifact = Some(reference),
                Err(e) if outcome.qr_artifact.is_some() => {
                    // The QR artifact stands on its own.
                    warn!(ticket_id = %ticket.id, error = %e, "Document rendering failed, keeping QR artifact");
                    outcome.document_error = Some(e.to_string());
                }
                Err(e) => {
                    warn!(ticket_id = %ticket.id, error = %e, "Document rendering failed");
                    outcome.retryable = e.is_retryable();
                    outcome.error_message = Some(format!("Document rendering failed: {e}"));
                    return outcome;
                }
            }
        }

        outcome.success = true;
        debug!(ticket_id = %ticket.id, "Ticket generated");
        outcome
    }

    async fn render_qr(
        &self,
        payload: &TicketBatchPayload,
        ticket: &TicketData,
        encoded: &str,
    ) -> Result<ArtifactRef, RenderError> {
        let artifact = self
            .qr_renderer
            .render_qr(encoded, &payload.renderer_options.qr)
            .await?;
        self.artifacts
            .store(&payload.batch_id, &format!("{}-qr", ticket.id), &artifact)
            .await
    }

    async fn render_document(
        &self,
        payload: &TicketBatchPayload,
        ticket: &TicketData,
        encoded: &str,
    ) -> Result<ArtifactRef, RenderError> {
        let user = payload.users.get(&ticket.user_id).unwrap_or(&Value::Null);
        let request = DocumentRequest {
            ticket,
            event: &payload.event,
            user,
            template: payload
                .renderer_options
                .template
                .as_deref()
                .unwrap_or(DEFAULT_TEMPLATE),
            token: encoded,
            options: &payload.renderer_options.document,
        };
        let artifact = self.document_renderer.render_document(&request).await?;
        self.artifacts
            .store(&payload.batch_id, &format!("{}-document", ticket.id), &artifact)
            .await
    }
}

#[async_trait]
impl JobHandler for TicketGenerationHandler {
    fn job_type(&self) -> &str {
        self.mode.job_type()
    }

    async fn handle(&self, ctx: &JobContext) -> Result<Value, JobError> {
        let payload: TicketBatchPayload = serde_json::from_value(ctx.payload().clone())
            .map_err(|e| JobError::permanent(format!("invalid generation payload: {e}")))?;
        if payload.tickets.is_empty() {
            return Err(JobError::permanent("generation payload has no tickets"));
        }

        let result = self.generate(&payload, ctx).await?;

        // A chunk where nothing succeeded and something may recover is retried
        // as a whole; otherwise partial results are final.
        if result.successful == 0 && result.outcomes.iter().any(|o| o.retryable) {
            let first_error = result
                .outcomes
                .iter()
                .find_map(|o| o.error_message.clone())
                .unwrap_or_default();
            return Err(JobError::retryable(format!(
                "all {} tickets failed: {}",
                result.total, first_error
            )));
        }

        info!(
            job_id = %ctx.job().id,
            batch_id = %payload.batch_id,
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            "Generation chunk finished"
        );
        serde_json::to_value(&result).map_err(|e| JobError::permanent(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningKey;
    use crate::testing::{fixtures, MemoryArtifactStore, MockDocumentRenderer, MockQrRenderer};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Setup {
        qr: Arc<MockQrRenderer>,
        documents: Arc<MockDocumentRenderer>,
        artifacts: Arc<MemoryArtifactStore>,
    }

    fn handler(mode: GenerationMode) -> (TicketGenerationHandler, Setup) {
        let setup = Setup {
            qr: Arc::new(MockQrRenderer::new()),
            documents: Arc::new(MockDocumentRenderer::new()),
            artifacts: Arc::new(MemoryArtifactStore::new()),
        };
        let handler = TicketGenerationHandler::new(
            mode,
            TokenSigner::new(SigningKey::new("gen-secret")),
            setup.qr.clone(),
            setup.documents.clone(),
            setup.artifacts.clone(),
        );
        (handler, setup)
    }

    fn context(mode: GenerationMode, payload: &TicketBatchPayload) -> JobContext {
        JobContext::detached(fixtures::job(
            mode.job_type(),
            serde_json::to_value(payload).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_qr_batch_signs_every_ticket() {
        let (handler, setup) = handler(GenerationMode::QrOnly);
        let payload = fixtures::batch_payload("b1", &["t1", "t2", "t3"]);

        let value = handler.handle(&context(GenerationMode::QrOnly, &payload)).await.unwrap();
        let result: BatchResult = serde_json::from_value(value).unwrap();

        assert_eq!((result.total, result.successful, result.failed), (3, 3, 0));
        let nonces: HashSet<String> = result
            .outcomes
            .iter()
            .map(|o| o.token.as_ref().unwrap().nonce.clone())
            .collect();
        assert_eq!(nonces.len(), 3);
        assert!(result.outcomes.iter().all(|o| o.qr_artifact.is_some()));
        assert!(result.outcomes.iter().all(|o| o.document_artifact.is_none()));
        assert_eq!(setup.artifacts.len(), 3);
        assert_eq!(setup.documents.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_tickets_do_not_abort_siblings() {
        let (handler, setup) = handler(GenerationMode::QrOnly);
        setup.qr.fail_for("t2");
        setup.qr.fail_for("t4");
        let payload = fixtures::batch_payload("b1", &["t1", "t2", "t3", "t4", "t5"]);

        let value = handler.handle(&context(GenerationMode::QrOnly, &payload)).await.unwrap();
        let result: BatchResult = serde_json::from_value(value).unwrap();

        assert_eq!(result.total, 5);
        assert_eq!(result.successful, 3);
        assert_eq!(result.failed, 2);
        let failed: Vec<&str> = result
            .outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.ticket_id.as_str())
            .collect();
        assert_eq!(failed, vec!["t2", "t4"]);
        assert!(result.outcomes[1].error_message.as_deref().unwrap().contains("QR rendering failed"));
    }

    #[tokio::test]
    async fn test_all_tickets_failing_transiently_retries_job() {
        let (handler, setup) = handler(GenerationMode::QrOnly);
        setup.qr.fail_all(true);
        let payload = fixtures::batch_payload("b1", &["t1", "t2"]);

        let err = handler
            .handle(&context(GenerationMode::QrOnly, &payload))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_tickets_are_final_outcomes() {
        let (handler, _setup) = handler(GenerationMode::QrOnly);
        let mut payload = fixtures::batch_payload("b1", &["t1"]);
        payload.tickets[0].event_id.clear();

        let value = handler.handle(&context(GenerationMode::QrOnly, &payload)).await.unwrap();
        let result: BatchResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.failed, 1);
        assert!(result.outcomes[0].error_message.as_deref().unwrap().contains("eventId"));
    }

    #[tokio::test]
    async fn test_composite_document_failure_keeps_qr() {
        let (handler, setup) = handler(GenerationMode::Composite);
        setup.documents.fail_for("t1");
        let payload = fixtures::batch_payload("b1", &["t1", "t2"]);

        let value = handler.handle(&context(GenerationMode::Composite, &payload)).await.unwrap();
        let result: BatchResult = serde_json::from_value(value).unwrap();

        let first = &result.outcomes[0];
        assert!(first.success);
        assert!(first.qr_artifact.is_some());
        assert!(first.document_artifact.is_none());
        assert!(first.document_error.is_some());
        assert!(result.outcomes[1].document_artifact.is_some());
    }

    #[tokio::test]
    async fn test_document_only_mode() {
        let (handler, setup) = handler(GenerationMode::DocumentOnly);
        let payload = fixtures::batch_payload("b1", &["t1"]);

        let value = handler
            .handle(&context(GenerationMode::DocumentOnly, &payload))
            .await
            .unwrap();
        let result: BatchResult = serde_json::from_value(value).unwrap();

        assert!(result.outcomes[0].document_artifact.is_some());
        assert!(result.outcomes[0].qr_artifact.is_none());
        assert_eq!(setup.qr.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_permanent() {
        let (handler, _setup) = handler(GenerationMode::QrOnly);
        let ctx = JobContext::detached(fixtures::job(
            "batch-ticket-generation",
            serde_json::json!({"nope": true}),
        ));
        let err = handler.handle(&ctx).await.unwrap_err();
        assert!(matches!(err, JobError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_generation() {
        let (handler, setup) = handler(GenerationMode::QrOnly);
        let payload = fixtures::batch_payload("b1", &["t1", "t2"]);
        let flag = Arc::new(AtomicBool::new(false));
        flag.store(true, Ordering::SeqCst);
        let ctx = JobContext::new(
            fixtures::job("batch-ticket-generation", serde_json::to_value(&payload).unwrap()),
            flag,
        );

        assert!(matches!(handler.handle(&ctx).await, Err(JobError::Cancelled)));
        assert_eq!(setup.qr.calls(), 0);
    }

    #[test]
    fn test_mode_routing() {
        assert_eq!(GenerationMode::QrOnly.queue(), QueueName::TicketGeneration);
        assert_eq!(GenerationMode::DocumentOnly.queue(), QueueName::DocumentGeneration);
        assert_eq!(GenerationMode::Composite.job_type(), "composite-batch-generation");
    }
}
