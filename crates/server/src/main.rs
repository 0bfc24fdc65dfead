use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticketgen_core::{
    load_config, validate_config, ArtifactStore, DeliveryFailureStore, FsArtifactStore,
    HttpWebhookTransport, InMemoryNonceStore, NonceStore, NonceStoreBackend, SanitizedConfig,
    SqliteDeliveryFailureStore, SqliteNonceStore,
    render::{JsonDocumentRenderer, RawPayloadRenderer},
};
use ticketgen_server::api::create_router;
use ticketgen_server::app::{build_state, Collaborators};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often expired nonce rows are deleted from SQLite.
const NONCE_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("TICKETGEN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Fingerprint of the redacted config, for correlating deployments
    let sanitized = SanitizedConfig::from(&config);
    let config_json = serde_json::to_string(&sanitized).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(version = VERSION, config_hash = &config_hash[..16], "Starting ticketgen");

    // Nonce store for single-use token enforcement
    let (nonce_store, purge_task) = match config.signing.nonce_store {
        NonceStoreBackend::Sqlite => {
            let store = Arc::new(
                SqliteNonceStore::new(&config.database.path)
                    .context("Failed to create nonce store")?,
            );
            let task = tokio::spawn(purge_expired_nonces(Arc::clone(&store)));
            (store as Arc<dyn NonceStore>, Some(task))
        }
        NonceStoreBackend::Memory => {
            warn!("Using in-memory nonce store: used tokens are forgotten on restart");
            (Arc::new(InMemoryNonceStore::new()) as Arc<dyn NonceStore>, None)
        }
    };
    info!("Nonce store initialized: {}", nonce_store.name());

    // Durable record of undeliverable webhooks
    let failure_store: Arc<dyn DeliveryFailureStore> = Arc::new(
        SqliteDeliveryFailureStore::new(&config.database.path)
            .context("Failed to create delivery failure store")?,
    );
    info!("Delivery failure store initialized");

    let transport = Arc::new(
        HttpWebhookTransport::new(Duration::from_secs(config.delivery.timeout_secs))
            .context("Failed to create webhook client")?,
    );
    match &config.delivery.webhook_url {
        Some(url) if config.delivery.enabled => info!("Delivering batch results to {}", url),
        _ if config.delivery.enabled => {
            info!("No default webhook configured; batches must carry a callbackUrl")
        }
        _ => warn!("Webhook delivery is disabled"),
    }

    let artifacts: Arc<dyn ArtifactStore> =
        Arc::new(FsArtifactStore::new(config.artifacts.output_dir.clone()));
    info!("Writing artifacts to {:?}", config.artifacts.output_dir);

    let addr = SocketAddr::new(config.server.host, config.server.port);

    let state = build_state(
        config,
        Collaborators {
            nonce_store,
            failure_store,
            transport,
            qr_renderer: Arc::new(RawPayloadRenderer),
            document_renderer: Arc::new(JsonDocumentRenderer),
            artifacts,
        },
    );

    // Start workers
    state.pool().start();
    info!("Worker pool started");

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Drain workers: in-flight jobs finish, nothing new is claimed
    info!("Server shutting down...");
    state.pool().stop().await;
    info!("Worker pool stopped");

    // Results of the last batches are delivered or persisted, never dropped
    let persisted = state
        .tracker()
        .drain(state.config().delivery_drain_timeout())
        .await;
    info!(persisted, "Pending deliveries drained");

    if let Some(task) = purge_task {
        task.abort();
    }

    Ok(())
}

async fn purge_expired_nonces(store: Arc<SqliteNonceStore>) {
    let mut interval = tokio::time::interval(NONCE_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        match store.purge_expired() {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Purged expired nonces"),
            Err(e) => warn!(error = %e, "Failed to purge expired nonces"),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
