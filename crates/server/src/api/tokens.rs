//! Ticket token validation handler.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use ticketgen_core::ValidatedTicket;

use super::ApiError;
use crate::state::AppState;

/// Request body for validating a scanned token
#[derive(Debug, Deserialize)]
pub struct ValidateTokenBody {
    /// Scanned QR content, either as the raw string or as a JSON object.
    pub token: Value,
}

#[derive(Debug, Serialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub ticket: ValidatedTicket,
}

/// Validate a scanned token and consume its nonce.
pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateTokenBody>,
) -> Result<Json<ValidateTokenResponse>, ApiError> {
    let raw = match body.token {
        Value::String(raw) => raw,
        other => other.to_string(),
    };
    let ticket = state.validator().validate(&raw).await?;
    Ok(Json(ValidateTokenResponse {
        valid: true,
        ticket,
    }))
}
