use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::types::{BatchProgress, BatchState};
use crate::delivery::DeliveryNotifier;
use crate::delivery::DeliveryOutcome;
use crate::generation::{BatchResult, TicketBatchPayload, TicketOutcome};
use crate::queue::Job;
use crate::worker::JobObserver;

/// Finished batches kept for status queries.
const DEFAULT_FINISHED_RETENTION: usize = 1000;

struct TrackedBatch {
    total_tickets: usize,
    jobs_total: usize,
    job_ids: Vec<String>,
    /// Per-chunk results, keyed by chunk index.
    chunks: BTreeMap<usize, BatchResult>,
    callback_url: Option<String>,
    submitted_at: DateTime<Utc>,
    started: Instant,
    finished_at: Option<DateTime<Utc>>,
    result: Option<BatchResult>,
    delivery: Option<DeliveryOutcome>,
}

impl TrackedBatch {
    fn merged(&self, batch_id: &str) -> BatchResult {
        let mut merged = BatchResult::new(batch_id);
        for chunk in self.chunks.values() {
            merged.merge(chunk.clone());
        }
        merged
    }
}

#[derive(Default)]
struct Batches {
    by_id: HashMap<String, TrackedBatch>,
    finished: VecDeque<String>,
}

/// A batch that just became terminal.
#[derive(Clone)]
struct Finished {
    batch_id: String,
    job_id: String,
    result: BatchResult,
    callback_url: Option<String>,
}

/// Aggregates job outcomes per batch and triggers delivery once.
///
/// Jobs are matched to batches through the `batchId` and `chunkIndex` in
/// their payload, so events for a job are handled even if they arrive before
/// the dispatcher has seen the job id. Each chunk is counted once; events
/// for a chunk that already finished (a replayed dead-letter entry, for
/// example) are ignored.
///
/// Deliveries run as tracked tasks. [`BatchTracker::drain`] waits for them on
/// shutdown and persists whatever did not finish in time.
pub struct BatchTracker {
    batches: Arc<Mutex<Batches>>,
    notifier: Option<Arc<DeliveryNotifier>>,
    finished_retention: usize,
    deliveries: Mutex<JoinSet<()>>,
    /// Finished batches whose delivery has not settled, keyed by batch id.
    pending: Arc<Mutex<HashMap<String, Finished>>>,
}

impl BatchTracker {
    pub fn new(notifier: Option<Arc<DeliveryNotifier>>) -> Self {
        Self {
            batches: Arc::new(Mutex::new(Batches::default())),
            notifier,
            finished_retention: DEFAULT_FINISHED_RETENTION,
            deliveries: Mutex::new(JoinSet::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_finished_retention(mut self, retention: usize) -> Self {
        self.finished_retention = retention.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Batches> {
        lock(&self.batches)
    }

    /// Start tracking a batch. Must happen before its jobs are enqueued.
    pub fn register(
        &self,
        batch_id: &str,
        total_tickets: usize,
        jobs_total: usize,
        callback_url: Option<String>,
    ) {
        self.lock().by_id.insert(
            batch_id.to_string(),
            TrackedBatch {
                total_tickets,
                jobs_total,
                job_ids: Vec::with_capacity(jobs_total),
                chunks: BTreeMap::new(),
                callback_url,
                submitted_at: Utc::now(),
                started: Instant::now(),
                finished_at: None,
                result: None,
                delivery: None,
            },
        );
    }

    pub fn attach_job(&self, batch_id: &str, job_id: &str) {
        if let Some(batch) = self.lock().by_id.get_mut(batch_id) {
            batch.job_ids.push(job_id.to_string());
        }
    }

    /// Stop tracking a batch whose submission was rolled back.
    pub fn abandon(&self, batch_id: &str) {
        self.lock().by_id.remove(batch_id);
    }

    pub fn progress(&self, batch_id: &str) -> Option<BatchProgress> {
        let batches = self.lock();
        let batch = batches.by_id.get(batch_id)?;
        let (state, result) = match &batch.result {
            Some(result) => (BatchState::from(result.status()), result.clone()),
            None => (BatchState::Processing, batch.merged(batch_id)),
        };
        Some(BatchProgress {
            batch_id: batch_id.to_string(),
            state,
            total_tickets: batch.total_tickets,
            jobs_total: batch.jobs_total,
            jobs_finished: batch.chunks.len(),
            job_ids: batch.job_ids.clone(),
            submitted_at: batch.submitted_at,
            finished_at: batch.finished_at,
            result,
            delivery: batch.delivery.clone(),
        })
    }

    fn record(&self, job: &Job, outcome: impl FnOnce(&TicketBatchPayload) -> BatchResult) {
        let payload: TicketBatchPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(job_id = %job.id, error = %e, "Job is not a batch chunk, ignoring");
                return;
            }
        };

        let finished = {
            let mut batches = self.lock();
            let Some(batch) = batches.by_id.get_mut(&payload.batch_id) else {
                debug!(job_id = %job.id, batch_id = %payload.batch_id, "Job for untracked batch, ignoring");
                return;
            };
            if batch.result.is_some() || batch.chunks.contains_key(&payload.chunk_index) {
                debug!(
                    job_id = %job.id,
                    batch_id = %payload.batch_id,
                    chunk = payload.chunk_index,
                    "Chunk already recorded, ignoring"
                );
                return;
            }

            let mut chunk = outcome(&payload);
            chunk.batch_id = payload.batch_id.clone();
            batch.chunks.insert(payload.chunk_index, chunk);
            if batch.chunks.len() < batch.jobs_total {
                return;
            }

            let mut result = batch.merged(&payload.batch_id);
            result.processing_time_ms = batch.started.elapsed().as_millis() as u64;
            batch.result = Some(result.clone());
            batch.finished_at = Some(Utc::now());

            let finished = Finished {
                batch_id: payload.batch_id.clone(),
                job_id: batch.job_ids.first().cloned().unwrap_or_else(|| job.id.clone()),
                result,
                callback_url: batch.callback_url.clone(),
            };
            batches.finished.push_back(payload.batch_id.clone());
            while batches.finished.len() > self.finished_retention {
                if let Some(evicted) = batches.finished.pop_front() {
                    batches.by_id.remove(&evicted);
                }
            }
            finished
        };

        info!(
            batch_id = %finished.batch_id,
            total = finished.result.total,
            successful = finished.result.successful,
            failed = finished.result.failed,
            status = finished.result.status().as_str(),
            "Batch finished"
        );
        self.deliver(finished);
    }

    fn deliver(&self, finished: Finished) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            error!(batch_id = %finished.batch_id, "No async runtime, persisting batch result");
            self.persist(&notifier, finished, "no async runtime to deliver batch result");
            return;
        };

        lock(&self.pending).insert(finished.batch_id.clone(), finished.clone());

        let batches = self.batches.clone();
        let pending = self.pending.clone();
        let mut deliveries = lock(&self.deliveries);
        while deliveries.try_join_next().is_some() {}
        deliveries.spawn_on(
            async move {
                let Finished {
                    batch_id,
                    job_id,
                    result,
                    callback_url,
                } = finished;
                match notifier
                    .deliver(&job_id, result, callback_url.as_deref())
                    .await
                {
                    Ok(outcome) => {
                        lock(&pending).remove(&batch_id);
                        set_delivery(&batches, &batch_id, outcome);
                    }
                    Err(e) => {
                        // Left pending so drain can try to persist it again.
                        error!(batch_id = %batch_id, error = %e, "Batch result delivery failed");
                    }
                }
            },
            &runtime,
        );
    }

    fn persist(&self, notifier: &DeliveryNotifier, finished: Finished, reason: &str) {
        match notifier.persist_pending(
            &finished.job_id,
            finished.result,
            finished.callback_url.as_deref(),
            reason,
        ) {
            Ok(outcome) => set_delivery(&self.batches, &finished.batch_id, outcome),
            Err(e) => error!(
                batch_id = %finished.batch_id,
                error = %e,
                "Batch result could not be delivered or persisted"
            ),
        }
    }

    /// Number of finished batches whose delivery has not settled.
    pub fn pending_deliveries(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Wait up to `timeout` for in-flight deliveries. Deliveries still running
    /// at the deadline are cancelled and their notifications persisted to the
    /// failure store. Returns the number persisted this way.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut deliveries = std::mem::take(&mut *lock(&self.deliveries));
        let settled = tokio::time::timeout(timeout, async {
            while deliveries.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !settled {
            warn!(
                in_flight = deliveries.len(),
                "Delivery drain deadline reached, cancelling in-flight deliveries"
            );
            deliveries.abort_all();
            while deliveries.join_next().await.is_some() {}
        }

        let Some(notifier) = self.notifier.clone() else {
            return 0;
        };
        let leftover: Vec<Finished> = lock(&self.pending).drain().map(|(_, f)| f).collect();
        let count = leftover.len();
        for finished in leftover {
            self.persist(&notifier, finished, "delivery interrupted by shutdown");
        }
        if count > 0 {
            info!(count, "Persisted undelivered batch results on shutdown");
        }
        count
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn set_delivery(batches: &Mutex<Batches>, batch_id: &str, outcome: DeliveryOutcome) {
    if let Some(batch) = lock(batches).by_id.get_mut(batch_id) {
        batch.delivery = Some(outcome);
    }
}

fn failed_chunk(payload: &TicketBatchPayload, reason: &str) -> BatchResult {
    let outcomes = payload
        .tickets
        .iter()
        .map(|ticket| TicketOutcome::failed(&ticket.id, reason))
        .collect();
    BatchResult::from_outcomes(&payload.batch_id, outcomes, 0)
}

impl JobObserver for BatchTracker {
    fn on_completed(&self, job: &Job) {
        self.record(job, |payload| {
            let parsed = job
                .return_value
                .clone()
                .map(serde_json::from_value::<BatchResult>);
            match parsed {
                Some(Ok(result)) => result,
                Some(Err(e)) => {
                    warn!(job_id = %job.id, error = %e, "Unreadable job result");
                    failed_chunk(payload, "job returned an unreadable result")
                }
                None => failed_chunk(payload, "job returned no result"),
            }
        });
    }

    fn on_failed(&self, job: &Job) {
        let reason = job.failed_reason.as_deref().unwrap_or("job failed");
        self.record(job, |payload| failed_chunk(payload, reason));
    }

    fn on_cancelled(&self, job: &Job) {
        self.record(job, |payload| failed_chunk(payload, "job cancelled"));
    }
}
