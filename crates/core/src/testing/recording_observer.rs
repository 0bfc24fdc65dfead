//! Observer that records lifecycle events.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::queue::Job;
use crate::worker::JobObserver;

#[derive(Debug, Default)]
struct Events {
    completed: Vec<Job>,
    retries: Vec<(Job, Duration)>,
    failed: Vec<Job>,
    stalled: Vec<Job>,
    cancelled: Vec<Job>,
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Events>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, Events> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn completed(&self) -> Vec<Job> {
        self.events().completed.clone()
    }

    pub fn retries(&self) -> Vec<(Job, Duration)> {
        self.events().retries.clone()
    }

    pub fn failed(&self) -> Vec<Job> {
        self.events().failed.clone()
    }

    pub fn stalled(&self) -> Vec<Job> {
        self.events().stalled.clone()
    }

    pub fn cancelled(&self) -> Vec<Job> {
        self.events().cancelled.clone()
    }
}

impl JobObserver for RecordingObserver {
    fn on_completed(&self, job: &Job) {
        self.events().completed.push(job.clone());
    }

    fn on_retry_scheduled(&self, job: &Job, delay: Duration) {
        self.events().retries.push((job.clone(), delay));
    }

    fn on_failed(&self, job: &Job) {
        self.events().failed.push(job.clone());
    }

    fn on_stalled(&self, job: &Job) {
        self.events().stalled.push(job.clone());
    }

    fn on_cancelled(&self, job: &Job) {
        self.events().cancelled.push(job.clone());
    }
}
