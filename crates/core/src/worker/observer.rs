use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::queue::Job;

/// Receives job lifecycle events.
///
/// Methods are called synchronously from worker tasks and must not block.
pub trait JobObserver: Send + Sync {
    fn on_completed(&self, _job: &Job) {}

    /// The job failed and will be retried after `delay`.
    fn on_retry_scheduled(&self, _job: &Job, _delay: Duration) {}

    /// The job failed for good and was dead-lettered.
    fn on_failed(&self, _job: &Job) {}

    /// The job's lease expired and it was requeued.
    fn on_stalled(&self, _job: &Job) {}

    fn on_cancelled(&self, _job: &Job) {}
}

/// Fans events out to registered observers.
#[derive(Default)]
pub struct ObserverSet {
    observers: RwLock<Vec<Arc<dyn JobObserver>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn JobObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    fn snapshot(&self) -> Vec<Arc<dyn JobObserver>> {
        self.observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl JobObserver for ObserverSet {
    fn on_completed(&self, job: &Job) {
        for observer in self.snapshot() {
            observer.on_completed(job);
        }
    }

    fn on_retry_scheduled(&self, job: &Job, delay: Duration) {
        for observer in self.snapshot() {
            observer.on_retry_scheduled(job, delay);
        }
    }

    fn on_failed(&self, job: &Job) {
        for observer in self.snapshot() {
            observer.on_failed(job);
        }
    }

    fn on_stalled(&self, job: &Job) {
        for observer in self.snapshot() {
            observer.on_stalled(job);
        }
    }

    fn on_cancelled(&self, job: &Job) {
        for observer in self.snapshot() {
            observer.on_cancelled(job);
        }
    }
}
