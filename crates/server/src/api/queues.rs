//! Queue statistics and dead-letter handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use ticketgen_core::{Job, QueueName, QueueStats};

use super::ApiError;
use crate::state::AppState;

/// Response for a dead-letter replay
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    pub dead_letter_id: String,
    pub job_id: String,
    pub queue: QueueName,
}

/// Per-queue job counts, computed on request.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.registry().stats())
}

pub async fn list_dead_letters(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(state.registry().dead_letters())
}

/// Re-enqueue a dead-letter entry into its origin queue.
pub async fn replay_dead_letter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ReplayResponse>), ApiError> {
    let job = state.registry().replay_dead_letter(&id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ReplayResponse {
            dead_letter_id: id,
            job_id: job.id,
            queue: job.queue,
        }),
    ))
}
