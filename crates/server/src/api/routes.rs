use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::{batches, deliveries, handlers, jobs, middleware::metrics_middleware, queues, tokens};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Batches
        .route("/batches", post(batches::submit_batch))
        .route("/batches/{id}", get(batches::get_batch))
        // Jobs
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::cancel_job))
        // Queues
        .route("/queues/stats", get(queues::get_stats))
        .route("/queues/dead-letter", get(queues::list_dead_letters))
        .route(
            "/queues/dead-letter/{id}/replay",
            post(queues::replay_dead_letter),
        )
        // Tokens
        .route("/tokens/validate", post(tokens::validate_token))
        // Deliveries
        .route("/deliveries/failed", get(deliveries::list_failed))
        .route(
            "/deliveries/failed/{id}/retry",
            post(deliveries::retry_failed),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics_middleware)),
        )
}
