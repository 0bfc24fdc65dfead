use thiserror::Error;

/// Failure sending one webhook request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Webhook request timed out")]
    Timeout,

    #[error("Webhook request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Client errors other than 408 and 429 will not change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            Self::Timeout | Self::Request(_) => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryStoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Delivery failure record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] DeliveryStoreError),

    #[error("Failed to encode webhook payload: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Delivery failure record {0} is already resolved")]
    AlreadyResolved(String),
}
