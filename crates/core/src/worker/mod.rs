//! Job execution.
//!
//! [`WorkerPool`] runs a fixed number of consumer tasks per worker queue.
//! Each consumer leases a job, runs the [`JobHandler`] registered for its
//! type while heartbeating the lease, and records the outcome through the
//! [`QueueRegistry`](crate::queue::QueueRegistry). Outcomes are reported to
//! [`JobObserver`]s.

mod handler;
mod observer;
mod pool;

pub use handler::{HandlerRegistry, JobContext, JobError, JobHandler};
pub use observer::{JobObserver, ObserverSet};
pub use pool::{PoolStatus, QueuePoolStatus, WorkerPool, WorkerPoolConfig};
