use thiserror::Error;

use crate::queue::QueueError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("batch contains no tickets")]
    EmptyBatch,

    #[error("batch of {size} tickets exceeds the maximum of {max}")]
    BatchSizeExceeded { size: usize, max: usize },

    #[error("ticket {index} is missing required fields: {fields}")]
    InvalidTicket { index: usize, fields: String },

    #[error("invalid batch options: {0}")]
    InvalidOptions(String),

    #[error("batch not found: {0}")]
    BatchNotFound(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("failed to encode job payload: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl DispatchError {
    /// Errors caused by the request itself rather than the server.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::EmptyBatch
            | Self::BatchSizeExceeded { .. }
            | Self::InvalidTicket { .. }
            | Self::InvalidOptions(_) => true,
            Self::Queue(QueueError::InvalidPriority(_) | QueueError::InvalidOptions(_)) => true,
            Self::BatchNotFound(_) | Self::Queue(_) | Self::Encoding(_) => false,
        }
    }
}
