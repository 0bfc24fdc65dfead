//! Mapping of core errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use ticketgen_core::{
    delivery::DeliveryStoreError, DeliveryError, DispatchError, QueueError, TokenError,
};
use tracing::error;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, "{}", self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
            }),
        )
            .into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        let (status, code) = match &e {
            QueueError::JobNotFound(_) => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
            QueueError::UnknownQueue(_) => (StatusCode::NOT_FOUND, "QUEUE_NOT_FOUND"),
            QueueError::InvalidPriority(_) => (StatusCode::BAD_REQUEST, "INVALID_PRIORITY"),
            QueueError::InvalidOptions(_) => (StatusCode::BAD_REQUEST, "INVALID_JOB_OPTIONS"),
            QueueError::DeadLetterEnqueue => (StatusCode::BAD_REQUEST, "DEAD_LETTER_ENQUEUE"),
            QueueError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_JOB_STATE"),
            QueueError::LeaseLost(_) => (StatusCode::CONFLICT, "LEASE_LOST"),
            QueueError::MissingOrigin(_) => (StatusCode::CONFLICT, "MISSING_ORIGIN"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        let message = e.to_string();
        let (status, code) = match e {
            DispatchError::Queue(inner) => return inner.into(),
            DispatchError::EmptyBatch => (StatusCode::BAD_REQUEST, "EMPTY_BATCH"),
            DispatchError::BatchSizeExceeded { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "BATCH_SIZE_EXCEEDED")
            }
            DispatchError::InvalidTicket { .. } => (StatusCode::BAD_REQUEST, "INVALID_TICKET"),
            DispatchError::InvalidOptions(_) => (StatusCode::BAD_REQUEST, "INVALID_OPTIONS"),
            DispatchError::BatchNotFound(_) => (StatusCode::NOT_FOUND, "BATCH_NOT_FOUND"),
            DispatchError::Encoding(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PAYLOAD_ENCODING_ERROR")
            }
        };
        Self::new(status, code, message)
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        let status = match &e {
            TokenError::InvalidTicketData(_)
            | TokenError::QrCodeFormat(_)
            | TokenError::InvalidQrData(_) => StatusCode::BAD_REQUEST,
            TokenError::QrCodeTampered => StatusCode::UNAUTHORIZED,
            TokenError::TicketExpired { .. } => StatusCode::GONE,
            TokenError::ReplayDetected { .. } => StatusCode::CONFLICT,
            TokenError::NonceStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TokenError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<DeliveryError> for ApiError {
    fn from(e: DeliveryError) -> Self {
        let (status, code) = match &e {
            DeliveryError::Store(DeliveryStoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "DELIVERY_RECORD_NOT_FOUND")
            }
            DeliveryError::Store(DeliveryStoreError::Database(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "DELIVERY_STORE_UNAVAILABLE")
            }
            DeliveryError::AlreadyResolved(_) => (StatusCode::CONFLICT, "ALREADY_RESOLVED"),
            DeliveryError::Transport(_) => (StatusCode::BAD_GATEWAY, "DELIVERY_FAILED"),
            DeliveryError::Encoding(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PAYLOAD_ENCODING_ERROR")
            }
        };
        Self::new(status, code, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_errors_map_to_client_statuses() {
        let e = ApiError::from(DispatchError::BatchSizeExceeded { size: 101, max: 100 });
        assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let e = ApiError::from(DispatchError::EmptyBatch);
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code(), "EMPTY_BATCH");
    }

    #[test]
    fn test_queue_error_inside_dispatch_error_keeps_its_status() {
        let e = ApiError::from(DispatchError::Queue(QueueError::InvalidPriority(
            "urgent".to_string(),
        )));
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.code(), "INVALID_PRIORITY");

        let e = ApiError::from(DispatchError::Queue(QueueError::JobNotFound("j".to_string())));
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_token_errors() {
        assert_eq!(
            ApiError::from(TokenError::QrCodeTampered).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(TokenError::ReplayDetected {
                ticket_id: "t1".to_string()
            })
            .status(),
            StatusCode::CONFLICT
        );
        let expired = ApiError::from(TokenError::TicketExpired {
            age_secs: 90000,
            ttl_secs: 86400,
        });
        assert_eq!(expired.status(), StatusCode::GONE);
        assert_eq!(expired.code(), "TICKET_EXPIRED");
    }

    #[test]
    fn test_delivery_errors() {
        let e = ApiError::from(DeliveryError::Store(DeliveryStoreError::NotFound(
            "r1".to_string(),
        )));
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(DeliveryError::AlreadyResolved("r1".to_string())).status(),
            StatusCode::CONFLICT
        );
    }
}
