//! Component wiring shared by the binary and the integration tests.

use std::sync::Arc;

use ticketgen_core::{
    worker::WorkerPoolConfig, ArtifactStore, BatchTracker, Config, DeliveryFailureStore,
    DeliveryNotifier, Dispatcher, DocumentRenderer, GenerationMode, HandlerRegistry, NonceStore,
    ObserverSet, QrRenderer, QueueRegistry, TicketGenerationHandler, TokenSigner, TokenValidator,
    WebhookTransport, WorkerPool,
};

use crate::state::AppState;

/// External collaborators. Production uses SQLite stores, the filesystem
/// and HTTP; tests inject mocks.
pub struct Collaborators {
    pub nonce_store: Arc<dyn NonceStore>,
    pub failure_store: Arc<dyn DeliveryFailureStore>,
    pub transport: Arc<dyn WebhookTransport>,
    pub qr_renderer: Arc<dyn QrRenderer>,
    pub document_renderer: Arc<dyn DocumentRenderer>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

/// Build the application graph: registry, handlers, worker pool, notifier,
/// tracker and dispatcher. The worker pool is created but not started.
pub fn build_state(config: Config, collaborators: Collaborators) -> Arc<AppState> {
    build_state_with_pool(config, collaborators, |pool| pool)
}

/// Like [`build_state`], with a hook to adjust worker pool timing.
pub fn build_state_with_pool(
    config: Config,
    collaborators: Collaborators,
    adjust_pool: impl FnOnce(WorkerPoolConfig) -> WorkerPoolConfig,
) -> Arc<AppState> {
    let registry = Arc::new(QueueRegistry::new(config.queue_settings()));

    let signer = TokenSigner::new(config.signing_key());
    let validator = Arc::new(TokenValidator::new(
        signer.clone(),
        collaborators.nonce_store,
        config.validator_settings(),
    ));

    let mut handlers = HandlerRegistry::new();
    for mode in GenerationMode::ALL {
        handlers.register(Arc::new(TicketGenerationHandler::new(
            mode,
            signer.clone(),
            collaborators.qr_renderer.clone(),
            collaborators.document_renderer.clone(),
            collaborators.artifacts.clone(),
        )));
    }

    let notifier = Arc::new(DeliveryNotifier::new(
        config.delivery_settings(),
        config.webhook_key(),
        collaborators.transport,
        collaborators.failure_store,
    ));
    let tracker = Arc::new(BatchTracker::new(Some(notifier.clone())));
    let observers = Arc::new(ObserverSet::new());
    observers.register(tracker.clone());

    let pool = Arc::new(WorkerPool::new(
        adjust_pool(config.worker_pool_config()),
        registry.clone(),
        Arc::new(handlers),
        observers.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        config.dispatcher_settings(),
        registry.clone(),
        tracker.clone(),
        observers,
    ));

    Arc::new(AppState::new(
        config, registry, dispatcher, validator, notifier, tracker, pool,
    ))
}
