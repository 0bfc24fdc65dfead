use std::sync::Arc;
use ticketgen_core::{
    BatchTracker, Config, DeliveryNotifier, Dispatcher, QueueRegistry, SanitizedConfig, TokenValidator,
    WorkerPool,
};

/// Shared application state
pub struct AppState {
    config: Config,
    registry: Arc<QueueRegistry>,
    dispatcher: Arc<Dispatcher>,
    validator: Arc<TokenValidator>,
    notifier: Arc<DeliveryNotifier>,
    tracker: Arc<BatchTracker>,
    pool: Arc<WorkerPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        registry: Arc<QueueRegistry>,
        dispatcher: Arc<Dispatcher>,
        validator: Arc<TokenValidator>,
        notifier: Arc<DeliveryNotifier>,
        tracker: Arc<BatchTracker>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
            validator,
            notifier,
            tracker,
            pool,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    pub fn notifier(&self) -> &DeliveryNotifier {
        &self.notifier
    }

    pub fn tracker(&self) -> &BatchTracker {
        &self.tracker
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
