use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::QueueError;
use super::job_queue::{CancelOutcome, FailOutcome, JobQueue, QueueSettings, StallOutcome};
use super::types::{Job, JobOptions, JobOrigin, JobState, QueueName, QueueStats};
use crate::metrics;

/// Owns the named queues.
///
/// Shared by reference between the dispatcher, the worker pool and the HTTP
/// layer; there is no process-wide queue state.
pub struct QueueRegistry {
    ticket_generation: Arc<JobQueue>,
    document_generation: Arc<JobQueue>,
    composite_batch: Arc<JobQueue>,
    dead_letter: Arc<JobQueue>,
}

impl QueueRegistry {
    /// Create the four queues. The dead-letter queue never trims entries.
    pub fn new(settings: QueueSettings) -> Self {
        let dead_letter_settings = QueueSettings {
            retention: None,
            ..settings.clone()
        };
        Self {
            ticket_generation: Arc::new(JobQueue::new(
                QueueName::TicketGeneration,
                settings.clone(),
            )),
            document_generation: Arc::new(JobQueue::new(
                QueueName::DocumentGeneration,
                settings.clone(),
            )),
            composite_batch: Arc::new(JobQueue::new(QueueName::CompositeBatch, settings)),
            dead_letter: Arc::new(JobQueue::new(QueueName::DeadLetter, dead_letter_settings)),
        }
    }

    pub fn queue(&self, name: QueueName) -> &Arc<JobQueue> {
        match name {
            QueueName::TicketGeneration => &self.ticket_generation,
            QueueName::DocumentGeneration => &self.document_generation,
            QueueName::CompositeBatch => &self.composite_batch,
            QueueName::DeadLetter => &self.dead_letter,
        }
    }

    fn all(&self) -> [&Arc<JobQueue>; 4] {
        QueueName::ALL.map(|name| self.queue(name))
    }

    pub fn enqueue(
        &self,
        queue: QueueName,
        job_type: &str,
        payload: Value,
        options: &JobOptions,
    ) -> Result<Job, QueueError> {
        if queue == QueueName::DeadLetter {
            return Err(QueueError::DeadLetterEnqueue);
        }
        if job_type.trim().is_empty() {
            return Err(QueueError::InvalidOptions("job type is empty".to_string()));
        }
        if options.attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "attempts must be at least 1".to_string(),
            ));
        }

        let job = self.queue(queue).enqueue(job_type, payload, options);
        info!(
            job_id = %job.id,
            queue = %queue,
            job_type = %job.job_type,
            priority = job.priority.as_str(),
            "Job enqueued"
        );
        Ok(job)
    }

    pub fn complete(
        &self,
        queue: QueueName,
        id: &str,
        token: u64,
        return_value: Value,
    ) -> Result<Job, QueueError> {
        self.queue(queue).complete(id, token, return_value)
    }

    /// Record a failed attempt, dead-lettering the job when it is exhausted.
    pub fn fail(
        &self,
        queue: QueueName,
        id: &str,
        token: u64,
        reason: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        let outcome = self.queue(queue).fail(id, token, reason, retryable)?;
        if let FailOutcome::Exhausted { job } = &outcome {
            self.dead_letter(job);
        }
        Ok(outcome)
    }

    /// Reclaim expired leases in one queue, dead-lettering exhausted jobs.
    pub fn reclaim_stalled(&self, queue: QueueName) -> Vec<StallOutcome> {
        let outcomes = self.queue(queue).reclaim_stalled();
        for outcome in &outcomes {
            metrics::JOBS_STALLED
                .with_label_values(&[queue.as_str()])
                .inc();
            match outcome {
                StallOutcome::Requeued(job) => {
                    warn!(job_id = %job.id, queue = %queue, stalled_count = job.stalled_count, "Job stalled, requeued");
                }
                StallOutcome::Failed(FailOutcome::Retrying { job, delay }) => {
                    warn!(job_id = %job.id, queue = %queue, attempts = job.attempts_made, delay_ms = delay.as_millis() as u64, "Job stalled past limit, retry scheduled");
                }
                StallOutcome::Failed(FailOutcome::Exhausted { job }) => {
                    self.dead_letter(job);
                }
            }
        }
        outcomes
    }

    fn dead_letter(&self, job: &Job) -> Job {
        let entry = Job {
            id: Uuid::new_v4().to_string(),
            queue: QueueName::DeadLetter,
            state: JobState::Failed,
            finished_at: job.finished_at.or_else(|| Some(Utc::now())),
            return_value: None,
            origin: Some(JobOrigin {
                queue: job.queue,
                job_id: job.id.clone(),
            }),
            ..job.clone()
        };
        self.dead_letter.insert_terminal(entry.clone());

        metrics::JOBS_DEAD_LETTERED
            .with_label_values(&[job.queue.as_str()])
            .inc();
        warn!(
            job_id = %job.id,
            dead_letter_id = %entry.id,
            queue = %job.queue,
            attempts = job.attempts_made,
            reason = job.failed_reason.as_deref().unwrap_or(""),
            "Job moved to dead-letter queue"
        );
        entry
    }

    /// Look a job up in every queue.
    pub fn find_job(&self, id: &str) -> Option<Job> {
        self.all().into_iter().find_map(|q| q.get(id))
    }

    /// Cancel a waiting or active job. Searches every worker queue when
    /// `queue` is `None`.
    pub fn cancel_job(
        &self,
        id: &str,
        queue: Option<QueueName>,
    ) -> Result<CancelOutcome, QueueError> {
        let queue = match queue {
            Some(queue) => queue,
            None => self
                .find_job(id)
                .map(|job| job.queue)
                .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?,
        };
        let outcome = self.queue(queue).cancel(id)?;
        info!(job_id = %id, queue = %queue, "Job cancelled");
        Ok(outcome)
    }

    /// Remove a terminal job from whichever queue holds it.
    pub fn remove_job(&self, id: &str) -> Result<Job, QueueError> {
        let job = self
            .find_job(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        self.queue(job.queue).remove_job(id)
    }

    pub fn dead_letters(&self) -> Vec<Job> {
        self.dead_letter.jobs()
    }

    /// The dead-letter entry created for a given job, if any.
    pub fn dead_letter_for(&self, job_id: &str) -> Option<Job> {
        self.dead_letter
            .jobs()
            .into_iter()
            .find(|entry| entry.origin.as_ref().is_some_and(|o| o.job_id == job_id))
    }

    /// Re-enqueue a dead-letter entry into its origin queue with a fresh
    /// attempt budget. The entry is removed.
    pub fn replay_dead_letter(&self, id: &str) -> Result<Job, QueueError> {
        let entry = self
            .dead_letter
            .get(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        let origin = entry
            .origin
            .clone()
            .filter(|o| o.queue != QueueName::DeadLetter)
            .ok_or_else(|| QueueError::MissingOrigin(id.to_string()))?;

        let entry = self.dead_letter.remove_job(id)?;
        let options = JobOptions {
            priority: entry.priority,
            delay: None,
            attempts: entry.max_attempts.max(1),
            backoff: entry.backoff,
        };
        let job = self
            .queue(origin.queue)
            .enqueue(&entry.job_type, entry.payload, &options);

        info!(
            dead_letter_id = %id,
            original_job_id = %origin.job_id,
            job_id = %job.id,
            queue = %origin.queue,
            "Dead-letter entry replayed"
        );
        Ok(job)
    }

    /// Per-queue counts, computed now.
    pub fn stats(&self) -> QueueStats {
        QueueName::ALL
            .into_iter()
            .map(|name| (name, self.queue(name).counts()))
            .collect()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new(QueueSettings::default())
    }
}
