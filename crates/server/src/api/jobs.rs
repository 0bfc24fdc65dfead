//! Job status and cancellation handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use ticketgen_core::{JobState, JobStatus, QueueName};

use super::ApiError;
use crate::state::AppState;

/// Response for a cancelled job
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelJobResponse {
    pub id: String,
    pub queue: QueueName,
    pub cancelled: bool,
    /// `waiting` jobs never ran; `active` jobs stop before their next ticket.
    pub previous_state: JobState,
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    Ok(Json(state.dispatcher().job_status(&id)?))
}

/// Cancel a waiting or active job. The job is removed from its queue.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelJobResponse>, ApiError> {
    let job = state.dispatcher().cancel_job(&id)?;
    Ok(Json(CancelJobResponse {
        id: job.id,
        queue: job.queue,
        cancelled: true,
        previous_state: job.state,
    }))
}
