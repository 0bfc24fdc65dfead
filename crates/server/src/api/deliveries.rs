//! Persisted delivery failure handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use ticketgen_core::{DeliveryFailureRecord, DeliveryOutcome};

use super::ApiError;
use crate::state::AppState;

/// Unresolved delivery failures, oldest first.
pub async fn list_failed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeliveryFailureRecord>>, ApiError> {
    Ok(Json(state.notifier().list_failures()?))
}

/// Retry one persisted notification.
pub async fn retry_failed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryOutcome>, ApiError> {
    Ok(Json(state.notifier().redeliver(&id).await?))
}
