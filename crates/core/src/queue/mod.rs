//! Job queues.
//!
//! A [`QueueRegistry`] owns one [`JobQueue`] per [`QueueName`]. Each queue
//! orders ready jobs by priority weight, then enqueue order, and hands them
//! out under a time-limited [`Lease`]. Jobs that exhaust their attempts are
//! copied into the dead-letter queue, which no worker consumes.

mod error;
mod job_queue;
mod registry;
mod types;

pub use error::QueueError;
pub use job_queue::{CancelOutcome, FailOutcome, JobQueue, Lease, QueueSettings, Retention, StallOutcome};
pub use registry::QueueRegistry;
pub use types::{
    BackoffPolicy, Job, JobOptions, JobOrigin, JobPriority, JobState, JobStatus, QueueCounts,
    QueueName, QueueStats,
};
