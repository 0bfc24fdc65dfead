pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod generation;
pub mod metrics;
pub mod nonce;
pub mod queue;
pub mod render;
pub mod signing;
pub mod testing;
pub mod token;
pub mod worker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, NonceStoreBackend,
    SanitizedConfig,
};
pub use delivery::{
    verify_webhook, DeliveryError, DeliveryFailureRecord, DeliveryFailureStore, DeliveryNotifier,
    DeliveryOutcome, DeliverySettings, HttpWebhookTransport, SqliteDeliveryFailureStore,
    WebhookPayload, WebhookTransport,
};
pub use dispatcher::{
    BatchProgress, BatchRequest, BatchState, BatchSubmission, BatchTracker, DispatchError,
    Dispatcher, DispatcherSettings,
};
pub use generation::{BatchResult, BatchStatus, GenerationMode, TicketGenerationHandler, TicketOutcome};
pub use nonce::{InMemoryNonceStore, NonceStore, NonceStoreError, SqliteNonceStore};
pub use queue::{
    Job, JobOptions, JobPriority, JobState, JobStatus, QueueCounts, QueueError, QueueName,
    QueueRegistry, QueueStats,
};
pub use render::{ArtifactStore, DocumentRenderer, FsArtifactStore, QrRenderer, RenderError};
pub use signing::SigningKey;
pub use token::{
    ReplayStoreFailurePolicy, SignedTicketToken, TicketData, TokenError, TokenSigner,
    TokenValidator, ValidatedTicket,
};
pub use worker::{HandlerRegistry, JobError, JobHandler, JobObserver, ObserverSet, WorkerPool};
