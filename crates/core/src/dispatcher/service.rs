use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use super::error::DispatchError;
use super::tracker::BatchTracker;
use super::types::{BatchOptions, BatchProgress, BatchRequest, BatchSubmission};
use crate::generation::TicketBatchPayload;
use crate::queue::{BackoffPolicy, Job, JobOptions, JobPriority, JobStatus, QueueError, QueueRegistry};
use crate::worker::{JobObserver, ObserverSet};

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Largest accepted batch, in tickets.
    pub max_batch_size: usize,
    /// Tickets per generation job. Larger batches are split.
    pub max_tickets_per_job: usize,
    pub default_attempts: u32,
    pub backoff: BackoffPolicy,
    pub estimate_base: Duration,
    pub estimate_per_ticket: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_tickets_per_job: 100,
            default_attempts: 3,
            backoff: BackoffPolicy::default(),
            estimate_base: Duration::from_secs(2),
            estimate_per_ticket: Duration::from_millis(500),
        }
    }
}

/// Accepts batch requests and turns them into generation jobs.
pub struct Dispatcher {
    settings: DispatcherSettings,
    registry: Arc<QueueRegistry>,
    tracker: Arc<BatchTracker>,
    observers: Arc<ObserverSet>,
}

impl Dispatcher {
    /// `observers` must include `tracker` for batches to finish.
    pub fn new(
        settings: DispatcherSettings,
        registry: Arc<QueueRegistry>,
        tracker: Arc<BatchTracker>,
        observers: Arc<ObserverSet>,
    ) -> Self {
        Self {
            settings,
            registry,
            tracker,
            observers,
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Validate a batch and enqueue its jobs. Returns immediately.
    pub fn submit(&self, request: BatchRequest) -> Result<BatchSubmission, DispatchError> {
        let size = request.tickets.len();
        if size == 0 {
            return Err(DispatchError::EmptyBatch);
        }
        if size > self.settings.max_batch_size {
            return Err(DispatchError::BatchSizeExceeded {
                size,
                max: self.settings.max_batch_size,
            });
        }
        for (index, ticket) in request.tickets.iter().enumerate() {
            let missing = ticket.missing_fields();
            if !missing.is_empty() {
                return Err(DispatchError::InvalidTicket {
                    index,
                    fields: missing.join(", "),
                });
            }
        }
        let options = self.job_options(&request.options)?;

        let mode = request.options.mode;
        let queue = mode.queue();
        let batch_id = Uuid::new_v4().to_string();
        let chunks: Vec<_> = request
            .tickets
            .chunks(self.settings.max_tickets_per_job.max(1))
            .map(<[_]>::to_vec)
            .collect();

        self.tracker.register(
            &batch_id,
            size,
            chunks.len(),
            request.options.callback_url.clone(),
        );

        let mut job_ids = Vec::with_capacity(chunks.len());
        for (chunk_index, tickets) in chunks.into_iter().enumerate() {
            let users: HashMap<_, _> = tickets
                .iter()
                .filter_map(|t| {
                    request
                        .users
                        .get(&t.user_id)
                        .map(|user| (t.user_id.clone(), user.clone()))
                })
                .collect();
            let payload = TicketBatchPayload {
                batch_id: batch_id.clone(),
                chunk_index,
                tickets,
                event: request.event.clone(),
                users,
                renderer_options: request.options.renderer_options.clone(),
            };

            let enqueued = serde_json::to_value(&payload)
                .map_err(DispatchError::from)
                .and_then(|payload| {
                    self.registry
                        .enqueue(queue, mode.job_type(), payload, &options)
                        .map_err(DispatchError::from)
                });
            match enqueued {
                Ok(job) => {
                    self.tracker.attach_job(&batch_id, &job.id);
                    job_ids.push(job.id);
                }
                Err(e) => {
                    self.rollback(&batch_id, &job_ids);
                    return Err(e);
                }
            }
        }

        let estimated_duration_seconds = self.estimate(size);
        info!(
            batch_id = %batch_id,
            tickets = size,
            jobs = job_ids.len(),
            queue = %queue,
            priority = options.priority.as_str(),
            "Batch submitted"
        );

        Ok(BatchSubmission {
            job_id: job_ids.first().cloned().unwrap_or_default(),
            batch_id,
            job_ids,
            estimated_duration_seconds,
        })
    }

    fn job_options(&self, options: &BatchOptions) -> Result<JobOptions, DispatchError> {
        let priority = match options.priority.as_deref() {
            Some(priority) => priority.parse::<JobPriority>()?,
            None => JobPriority::Normal,
        };
        let attempts = options.attempts.unwrap_or(self.settings.default_attempts);
        if attempts == 0 {
            return Err(DispatchError::InvalidOptions(
                "attempts must be at least 1".to_string(),
            ));
        }
        Ok(JobOptions {
            priority,
            delay: options
                .delay
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            attempts,
            backoff: self.settings.backoff,
        })
    }

    fn rollback(&self, batch_id: &str, job_ids: &[String]) {
        for id in job_ids {
            if let Err(e) = self.registry.cancel_job(id, None) {
                warn!(batch_id = %batch_id, job_id = %id, error = %e, "Failed to roll back job");
            }
        }
        self.tracker.abandon(batch_id);
    }

    /// Linear in the ticket count, rounded up to whole seconds.
    pub fn estimate(&self, tickets: usize) -> u64 {
        let total_ms = self.settings.estimate_base.as_millis()
            + self.settings.estimate_per_ticket.as_millis() * tickets as u128;
        total_ms.div_ceil(1000) as u64
    }

    pub fn job_status(&self, job_id: &str) -> Result<JobStatus, DispatchError> {
        self.registry
            .find_job(job_id)
            .map(|job| JobStatus::from(&job))
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()).into())
    }

    /// Cancel a waiting or active job.
    ///
    /// Best effort: an active job stops before its next ticket, and artifacts
    /// it already wrote are kept. Its tickets are reported as failed.
    pub fn cancel_job(&self, job_id: &str) -> Result<Job, DispatchError> {
        let outcome = self.registry.cancel_job(job_id, None)?;
        let job = outcome.job().clone();
        self.observers.on_cancelled(&job);
        Ok(job)
    }

    pub fn batch_status(&self, batch_id: &str) -> Result<BatchProgress, DispatchError> {
        self.tracker
            .progress(batch_id)
            .ok_or_else(|| DispatchError::BatchNotFound(batch_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::BatchState;
    use crate::generation::GenerationMode;
    use crate::queue::{JobState, QueueName};
    use crate::testing::fixtures;
    use crate::token::TicketData;

    struct Setup {
        dispatcher: Dispatcher,
        registry: Arc<QueueRegistry>,
        tracker: Arc<BatchTracker>,
    }

    fn setup(settings: DispatcherSettings) -> Setup {
        let registry = Arc::new(QueueRegistry::default());
        let tracker = Arc::new(BatchTracker::new(None));
        let observers = Arc::new(ObserverSet::new());
        observers.register(tracker.clone());
        Setup {
            dispatcher: Dispatcher::new(settings, registry.clone(), tracker.clone(), observers),
            registry,
            tracker,
        }
    }

    fn request(ids: &[&str]) -> BatchRequest {
        BatchRequest {
            tickets: ids.iter().map(|id| fixtures::ticket(id)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_submit_enqueues_one_job() {
        let s = setup(DispatcherSettings::default());
        let mut req = request(&["t1", "t2", "t3"]);
        req.options.priority = Some("high".to_string());

        let submission = s.dispatcher.submit(req).unwrap();
        assert_eq!(submission.job_ids.len(), 1);
        assert_eq!(submission.job_id, submission.job_ids[0]);

        let job = s.registry.find_job(&submission.job_id).unwrap();
        assert_eq!(job.queue, QueueName::TicketGeneration);
        assert_eq!(job.job_type, "batch-ticket-generation");
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.max_attempts, 3);
        let payload: TicketBatchPayload = serde_json::from_value(job.payload).unwrap();
        assert_eq!(payload.batch_id, submission.batch_id);
        assert_eq!(payload.tickets.len(), 3);

        let progress = s.dispatcher.batch_status(&submission.batch_id).unwrap();
        assert_eq!(progress.state, BatchState::Processing);
        assert_eq!(progress.total_tickets, 3);
        assert_eq!(progress.job_ids, submission.job_ids);
    }

    #[test]
    fn test_mode_selects_queue() {
        let s = setup(DispatcherSettings::default());
        let mut req = request(&["t1"]);
        req.options.mode = GenerationMode::Composite;

        let submission = s.dispatcher.submit(req).unwrap();
        let job = s.registry.find_job(&submission.job_id).unwrap();
        assert_eq!(job.queue, QueueName::CompositeBatch);
        assert_eq!(job.job_type, "composite-batch-generation");
    }

    #[test]
    fn test_large_batch_is_chunked() {
        let s = setup(DispatcherSettings {
            max_tickets_per_job: 2,
            ..Default::default()
        });
        let submission = s
            .dispatcher
            .submit(request(&["t1", "t2", "t3", "t4", "t5"]))
            .unwrap();
        assert_eq!(submission.job_ids.len(), 3);

        let sizes: Vec<(usize, usize)> = submission
            .job_ids
            .iter()
            .map(|id| {
                let job = s.registry.find_job(id).unwrap();
                let payload: TicketBatchPayload = serde_json::from_value(job.payload).unwrap();
                (payload.chunk_index, payload.tickets.len())
            })
            .collect();
        assert_eq!(sizes, vec![(0, 2), (1, 2), (2, 1)]);
        assert_eq!(
            s.tracker.progress(&submission.batch_id).unwrap().jobs_total,
            3
        );
    }

    #[test]
    fn test_rejects_empty_and_oversized_batches() {
        let s = setup(DispatcherSettings {
            max_batch_size: 2,
            ..Default::default()
        });
        assert!(matches!(
            s.dispatcher.submit(request(&[])),
            Err(DispatchError::EmptyBatch)
        ));
        let err = s.dispatcher.submit(request(&["a", "b", "c"])).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::BatchSizeExceeded { size: 3, max: 2 }
        ));
        assert!(err.is_client_error());
        assert_eq!(s.registry.stats()[&QueueName::TicketGeneration].waiting, 0);
    }

    #[test]
    fn test_rejects_invalid_tickets_and_options() {
        let s = setup(DispatcherSettings::default());

        let mut req = request(&["t1"]);
        req.tickets.push(TicketData::new("t2", "", "u2"));
        assert!(matches!(
            s.dispatcher.submit(req),
            Err(DispatchError::InvalidTicket { index: 1, .. })
        ));

        let mut req = request(&["t1"]);
        req.options.priority = Some("urgent".to_string());
        let err = s.dispatcher.submit(req).unwrap_err();
        assert!(matches!(err, DispatchError::Queue(QueueError::InvalidPriority(_))));
        assert!(err.is_client_error());

        let mut req = request(&["t1"]);
        req.options.attempts = Some(0);
        assert!(matches!(
            s.dispatcher.submit(req),
            Err(DispatchError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_options_are_applied() {
        let s = setup(DispatcherSettings::default());
        let mut req = request(&["t1"]);
        req.options.attempts = Some(5);
        req.options.delay = Some(60_000);

        let submission = s.dispatcher.submit(req).unwrap();
        let job = s.registry.find_job(&submission.job_id).unwrap();
        assert_eq!(job.max_attempts, 5);
        assert!(job.available_at > job.created_at);
    }

    #[test]
    fn test_estimate_is_linear() {
        let s = setup(DispatcherSettings::default());
        assert_eq!(s.dispatcher.estimate(0), 2);
        assert_eq!(s.dispatcher.estimate(1), 3);
        assert_eq!(s.dispatcher.estimate(10), 7);
        assert_eq!(s.dispatcher.estimate(100), 52);
    }

    #[test]
    fn test_job_status_and_cancel() {
        let s = setup(DispatcherSettings::default());
        let submission = s.dispatcher.submit(request(&["t1", "t2"])).unwrap();

        let status = s.dispatcher.job_status(&submission.job_id).unwrap();
        assert_eq!(status.state, JobState::Waiting);
        assert_eq!(status.attempts_made, 0);

        s.dispatcher.cancel_job(&submission.job_id).unwrap();
        assert!(matches!(
            s.dispatcher.job_status(&submission.job_id),
            Err(DispatchError::Queue(QueueError::JobNotFound(_)))
        ));

        let progress = s.dispatcher.batch_status(&submission.batch_id).unwrap();
        assert_eq!(progress.state, BatchState::Failed);
        assert_eq!(progress.result.failed, 2);
    }

    #[test]
    fn test_unknown_batch() {
        let s = setup(DispatcherSettings::default());
        assert!(matches!(
            s.dispatcher.batch_status("nope"),
            Err(DispatchError::BatchNotFound(_))
        ));
    }
}
