//! Batch submission and progress handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use ticketgen_core::{BatchProgress, BatchRequest, BatchSubmission};

use super::ApiError;
use crate::state::AppState;

/// Accept a batch for asynchronous generation.
///
/// Responds 202 as soon as the jobs are enqueued. The final result arrives
/// through the webhook or `GET /batches/{id}`.
pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchSubmission>), ApiError> {
    let submission = state.dispatcher().submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchProgress>, ApiError> {
    Ok(Json(state.dispatcher().batch_status(&id)?))
}
