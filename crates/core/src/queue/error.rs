use thiserror::Error;

use super::types::JobState;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The caller's lease is no longer valid: the job was reclaimed after a
    /// stall, cancelled, or already finished.
    #[error("lease lost for job {0}")]
    LeaseLost(String),

    #[error("cannot {action} job {id} in state {state}")]
    InvalidState {
        id: String,
        state: JobState,
        action: &'static str,
    },

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("invalid priority: {0} (expected critical, high, normal or low)")]
    InvalidPriority(String),

    #[error("invalid job options: {0}")]
    InvalidOptions(String),

    #[error("jobs cannot be enqueued into the dead-letter queue")]
    DeadLetterEnqueue,

    #[error("dead-letter entry {0} has no origin queue")]
    MissingOrigin(String),
}
