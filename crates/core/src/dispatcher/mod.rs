//! Batch submission and tracking.
//!
//! [`Dispatcher`] turns a batch request into one or more generation jobs.
//! [`BatchTracker`] watches those jobs and, once every one of them is
//! terminal, hands the merged [`BatchResult`](crate::generation::BatchResult)
//! to the delivery notifier.

mod error;
mod service;
mod tracker;
mod types;

pub use error::DispatchError;
pub use service::{Dispatcher, DispatcherSettings};
pub use tracker::BatchTracker;
pub use types::{BatchOptions, BatchProgress, BatchRequest, BatchState, BatchSubmission};
