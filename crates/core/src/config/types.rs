use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::DeliverySettings;
use crate::dispatcher::DispatcherSettings;
use crate::queue::{BackoffPolicy, QueueSettings, Retention};
use crate::signing::SigningKey;
use crate::token::{ReplayStoreFailurePolicy, ValidatorSettings};
use crate::worker::WorkerPoolConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub signing: SigningConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration. Holds consumed nonces and delivery failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("ticketgen.db")
}

/// Where consumed nonces are recorded.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NonceStoreBackend {
    #[default]
    Sqlite,
    /// Process-local. Replay protection does not survive restarts.
    Memory,
}

/// Token signing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SigningConfig {
    /// Shared HMAC secret for ticket tokens
    pub secret: String,
    #[serde(default = "default_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Must be at least `token_ttl_secs`
    #[serde(default = "default_ttl_secs")]
    pub nonce_ttl_secs: u64,
    #[serde(default)]
    pub nonce_store: NonceStoreBackend,
    /// Behavior when the nonce store cannot be reached during validation
    #[serde(default)]
    pub replay_store_failure_policy: ReplayStoreFailurePolicy,
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// Queue and worker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueuesConfig {
    #[serde(default = "default_attempts")]
    pub default_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,
    #[serde(default = "default_stall_check_interval_ms")]
    pub stall_check_interval_ms: u64,
    /// Stalls tolerated before a stall counts as a failed attempt
    #[serde(default = "default_max_stalled_count")]
    pub max_stalled_count: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            default_attempts: default_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            lease_duration_ms: default_lease_duration_ms(),
            stall_check_interval_ms: default_stall_check_interval_ms(),
            max_stalled_count: default_max_stalled_count(),
            poll_interval_ms: default_poll_interval_ms(),
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_lease_duration_ms() -> u64 {
    30_000
}

fn default_stall_check_interval_ms() -> u64 {
    5000
}

fn default_max_stalled_count() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_keep_completed() -> usize {
    100
}

fn default_keep_failed() -> usize {
    500
}

/// Workers per queue
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_ticket_generation")]
    pub ticket_generation: usize,
    #[serde(default = "default_document_generation")]
    pub document_generation: usize,
    #[serde(default = "default_composite_batch")]
    pub composite_batch: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            ticket_generation: default_ticket_generation(),
            document_generation: default_document_generation(),
            composite_batch: default_composite_batch(),
        }
    }
}

fn default_ticket_generation() -> usize {
    5
}

fn default_document_generation() -> usize {
    3
}

fn default_composite_batch() -> usize {
    2
}

/// Batch submission limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_tickets_per_job")]
    pub max_tickets_per_job: usize,
    #[serde(default = "default_estimate_base_secs")]
    pub estimate_base_secs: u64,
    #[serde(default = "default_estimate_per_ticket_ms")]
    pub estimate_per_ticket_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_tickets_per_job: default_max_tickets_per_job(),
            estimate_base_secs: default_estimate_base_secs(),
            estimate_per_ticket_ms: default_estimate_per_ticket_ms(),
        }
    }
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_tickets_per_job() -> usize {
    100
}

fn default_estimate_base_secs() -> u64 {
    2
}

fn default_estimate_per_ticket_ms() -> u64 {
    500
}

/// Result delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Used when a batch has no callback URL
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Webhook signing secret (default: signing.secret)
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
    /// How long shutdown waits for in-flight deliveries before persisting them
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            secret: None,
            retry_delays_ms: default_retry_delays_ms(),
            timeout_secs: default_delivery_timeout(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![1000, 5000, 15000]
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_drain_timeout() -> u64 {
    30
}

/// Rendered artifact storage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

impl Config {
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::new(self.signing.secret.as_bytes())
    }

    /// Webhook key, falling back to the token signing secret.
    pub fn webhook_key(&self) -> SigningKey {
        match self.delivery.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => SigningKey::new(secret.as_bytes()),
            None => self.signing_key(),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay_ms: self.queues.backoff_base_ms,
            multiplier: self.queues.backoff_multiplier,
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            lease_duration: Duration::from_millis(self.queues.lease_duration_ms),
            max_stalled_count: self.queues.max_stalled_count,
            retention: Some(Retention {
                keep_completed: self.queues.keep_completed,
                keep_failed: self.queues.keep_failed,
            }),
        }
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            ticket_generation_concurrency: self.queues.concurrency.ticket_generation,
            document_generation_concurrency: self.queues.concurrency.document_generation,
            composite_batch_concurrency: self.queues.concurrency.composite_batch,
            poll_interval: Duration::from_millis(self.queues.poll_interval_ms),
            stall_check_interval: Duration::from_millis(self.queues.stall_check_interval_ms),
        }
    }

    pub fn validator_settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            token_ttl: Duration::from_secs(self.signing.token_ttl_secs),
            nonce_ttl: Duration::from_secs(self.signing.nonce_ttl_secs),
            failure_policy: self.signing.replay_store_failure_policy,
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            max_batch_size: self.dispatcher.max_batch_size,
            max_tickets_per_job: self.dispatcher.max_tickets_per_job,
            default_attempts: self.queues.default_attempts,
            backoff: self.backoff(),
            estimate_base: Duration::from_secs(self.dispatcher.estimate_base_secs),
            estimate_per_ticket: Duration::from_millis(self.dispatcher.estimate_per_ticket_ms),
        }
    }

    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            enabled: self.delivery.enabled,
            default_url: self.delivery.webhook_url.clone(),
            retry_delays: self
                .delivery
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }

    pub fn delivery_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.drain_timeout_secs)
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub signing: SanitizedSigningConfig,
    pub queues: QueuesConfig,
    pub dispatcher: DispatcherConfig,
    pub delivery: SanitizedDeliveryConfig,
    pub artifacts: ArtifactsConfig,
}

/// Sanitized signing config (secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSigningConfig {
    pub secret_configured: bool,
    pub token_ttl_secs: u64,
    pub nonce_ttl_secs: u64,
    pub nonce_store: NonceStoreBackend,
    pub replay_store_failure_policy: ReplayStoreFailurePolicy,
}

/// Sanitized delivery config (secret hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDeliveryConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub dedicated_secret_configured: bool,
    pub retry_delays_ms: Vec<u64>,
    pub timeout_secs: u64,
    pub drain_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            signing: SanitizedSigningConfig {
                secret_configured: !config.signing.secret.is_empty(),
                token_ttl_secs: config.signing.token_ttl_secs,
                nonce_ttl_secs: config.signing.nonce_ttl_secs,
                nonce_store: config.signing.nonce_store,
                replay_store_failure_policy: config.signing.replay_store_failure_policy,
            },
            queues: config.queues.clone(),
            dispatcher: config.dispatcher.clone(),
            delivery: SanitizedDeliveryConfig {
                enabled: config.delivery.enabled,
                webhook_url: config.delivery.webhook_url.clone(),
                dedicated_secret_configured: config
                    .delivery
                    .secret
                    .as_deref()
                    .is_some_and(|s| !s.is_empty()),
                retry_delays_ms: config.delivery.retry_delays_ms.clone(),
                timeout_secs: config.delivery.timeout_secs,
                drain_timeout_secs: config.delivery.drain_timeout_secs,
            },
            artifacts: config.artifacts.clone(),
        }
    }
}
