use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use super::error::QueueError;
use super::types::{Job, JobOptions, JobState, QueueCounts, QueueName};

/// How many terminal jobs a queue keeps around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub keep_completed: usize,
    pub keep_failed: usize,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// How long a dequeued job may go without a heartbeat.
    pub lease_duration: Duration,
    /// Stalls tolerated before a stall counts as a failed attempt.
    pub max_stalled_count: u32,
    /// `None` keeps every terminal job.
    pub retention: Option<Retention>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(30),
            max_stalled_count: 1,
            retention: Some(Retention {
                keep_completed: 100,
                keep_failed: 500,
            }),
        }
    }
}

/// A dequeued job, owned by one worker until completed, failed or lost.
#[derive(Debug, Clone)]
pub struct Lease {
    pub job: Job,
    pub token: u64,
    pub expires_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
}

impl Lease {
    /// Flag set when the job is cancelled or reclaimed while this lease is held.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone)]
pub enum FailOutcome {
    /// Rescheduled after `delay`.
    Retrying { job: Job, delay: Duration },
    /// No attempts left (or the failure was permanent). The job is `failed`.
    Exhausted { job: Job },
}

#[derive(Debug, Clone)]
pub enum StallOutcome {
    /// Requeued as `stalled` without consuming an attempt.
    Requeued(Job),
    /// Stall ceiling exceeded; handled like a handler failure.
    Failed(FailOutcome),
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The job was waiting and has been removed.
    Removed(Job),
    /// The job was active. Its worker has been signalled and its result will
    /// be discarded; side effects already produced are kept.
    Aborted(Job),
}

impl CancelOutcome {
    pub fn job(&self) -> &Job {
        match self {
            CancelOutcome::Removed(job) | CancelOutcome::Aborted(job) => job,
        }
    }
}

struct ActiveLease {
    token: u64,
    expires_at: DateTime<Utc>,
}

struct Entry {
    job: Job,
    seq: u64,
    lease: Option<ActiveLease>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Entry>,
    /// (priority weight, enqueue sequence, id)
    ready: BTreeSet<(u8, u64, String)>,
    /// (available at, enqueue sequence, id)
    delayed: BTreeSet<(DateTime<Utc>, u64, String)>,
    completed: VecDeque<String>,
    failed: VecDeque<String>,
    next_seq: u64,
    next_token: u64,
}

impl Inner {
    fn schedule(&mut self, id: &str, now: DateTime<Utc>) {
        let Some(entry) = self.jobs.get(id) else {
            return;
        };
        if entry.job.available_at > now {
            self.delayed
                .insert((entry.job.available_at, entry.seq, id.to_string()));
        } else {
            self.ready
                .insert((entry.job.priority.weight(), entry.seq, id.to_string()));
        }
    }

    fn promote_due(&mut self, now: DateTime<Utc>) {
        while let Some((available_at, _, _)) = self.delayed.first() {
            if *available_at > now {
                break;
            }
            let Some((_, seq, id)) = self.delayed.pop_first() else {
                break;
            };
            if let Some(entry) = self.jobs.get(&id) {
                self.ready.insert((entry.job.priority.weight(), seq, id));
            }
        }
    }

    fn unschedule(&mut self, id: &str) {
        self.ready.retain(|(_, _, queued)| queued != id);
        self.delayed.retain(|(_, _, queued)| queued != id);
    }

    fn leased_entry(&mut self, id: &str, token: u64) -> Result<&mut Entry, QueueError> {
        match self.jobs.get_mut(id) {
            Some(entry)
                if entry.job.state == JobState::Active
                    && entry.lease.as_ref().is_some_and(|l| l.token == token) =>
            {
                Ok(entry)
            }
            _ => Err(QueueError::LeaseLost(id.to_string())),
        }
    }

    fn record_failure(
        &mut self,
        id: &str,
        reason: &str,
        retryable: bool,
        now: DateTime<Utc>,
        retention: Option<Retention>,
    ) -> Option<FailOutcome> {
        let entry = self.jobs.get_mut(id)?;
        entry.lease = None;
        let job = &mut entry.job;
        job.attempts_made += 1;
        job.failed_reason = Some(reason.to_string());

        if retryable && job.attempts_made < job.max_attempts {
            let delay = job.backoff.delay_for_attempt(job.attempts_made);
            job.state = JobState::Waiting;
            job.available_at = now + to_chrono(delay);
            let snapshot = job.clone();
            self.schedule(id, now);
            Some(FailOutcome::Retrying {
                job: snapshot,
                delay,
            })
        } else {
            job.state = JobState::Failed;
            job.finished_at = Some(now);
            let snapshot = job.clone();
            self.failed.push_back(id.to_string());
            self.trim(retention);
            Some(FailOutcome::Exhausted { job: snapshot })
        }
    }

    fn trim(&mut self, retention: Option<Retention>) {
        let Some(retention) = retention else {
            return;
        };
        while self.completed.len() > retention.keep_completed {
            if let Some(id) = self.completed.pop_front() {
                self.jobs.remove(&id);
            }
        }
        while self.failed.len() > retention.keep_failed {
            if let Some(id) = self.failed.pop_front() {
                self.jobs.remove(&id);
            }
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis().min(i64::MAX as u128) as i64)
}

/// A single named queue.
pub struct JobQueue {
    name: QueueName,
    settings: QueueSettings,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl JobQueue {
    pub fn new(name: QueueName, settings: QueueSettings) -> Self {
        Self {
            name,
            settings,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Signalled whenever a job becomes ready.
    pub fn notifier(&self) -> &Notify {
        &self.notify
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, job_type: &str, payload: Value, options: &JobOptions) -> Job {
        self.enqueue_at(job_type, payload, options, Utc::now())
    }

    pub fn enqueue_at(
        &self,
        job_type: &str,
        payload: Value,
        options: &JobOptions,
        now: DateTime<Utc>,
    ) -> Job {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            queue: self.name,
            job_type: job_type.to_string(),
            payload,
            priority: options.priority,
            state: JobState::Waiting,
            attempts_made: 0,
            max_attempts: options.attempts,
            backoff: options.backoff,
            stalled_count: 0,
            created_at: now,
            available_at: now + to_chrono(options.delay.unwrap_or_default()),
            processed_at: None,
            finished_at: None,
            failed_reason: None,
            return_value: None,
            origin: None,
        };

        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            job.id.clone(),
            Entry {
                job: job.clone(),
                seq,
                lease: None,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        );
        inner.schedule(&job.id, now);
        drop(inner);

        self.notify.notify_one();
        job
    }

    /// Store a terminal job as-is. Used for dead-letter entries.
    pub(crate) fn insert_terminal(&self, job: Job) {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = job.id.clone();
        let state = job.state;
        inner.jobs.insert(
            id.clone(),
            Entry {
                job,
                seq,
                lease: None,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        );
        match state {
            JobState::Completed => inner.completed.push_back(id),
            _ => inner.failed.push_back(id),
        }
        inner.trim(self.settings.retention);
    }

    pub fn try_dequeue(&self) -> Option<Lease> {
        self.try_dequeue_at(Utc::now())
    }

    /// Take the highest-priority ready job, oldest first within a priority.
    pub fn try_dequeue_at(&self, now: DateTime<Utc>) -> Option<Lease> {
        let mut inner = self.lock();
        inner.promote_due(now);

        let (_, _, id) = inner.ready.pop_first()?;
        let token = inner.next_token;
        inner.next_token += 1;
        let expires_at = now + to_chrono(self.settings.lease_duration);

        let entry = inner.jobs.get_mut(&id)?;
        entry.job.state = JobState::Active;
        entry.job.processed_at = Some(now);
        entry.lease = Some(ActiveLease { token, expires_at });

        Some(Lease {
            job: entry.job.clone(),
            token,
            expires_at,
            cancelled: Arc::clone(&entry.cancelled),
        })
    }

    pub fn heartbeat(&self, id: &str, token: u64) -> Result<DateTime<Utc>, QueueError> {
        self.heartbeat_at(id, token, Utc::now())
    }

    /// Extend a lease. Returns the new expiry.
    pub fn heartbeat_at(
        &self,
        id: &str,
        token: u64,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, QueueError> {
        let mut inner = self.lock();
        let entry = inner.leased_entry(id, token)?;
        let expires_at = now + to_chrono(self.settings.lease_duration);
        entry.lease = Some(ActiveLease { token, expires_at });
        Ok(expires_at)
    }

    pub fn complete(&self, id: &str, token: u64, return_value: Value) -> Result<Job, QueueError> {
        self.complete_at(id, token, return_value, Utc::now())
    }

    pub fn complete_at(
        &self,
        id: &str,
        token: u64,
        return_value: Value,
        now: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let mut inner = self.lock();
        let entry = inner.leased_entry(id, token)?;
        entry.lease = None;
        entry.job.attempts_made += 1;
        entry.job.state = JobState::Completed;
        entry.job.finished_at = Some(now);
        entry.job.return_value = Some(return_value);
        let job = entry.job.clone();

        inner.completed.push_back(id.to_string());
        inner.trim(self.settings.retention);
        Ok(job)
    }

    pub fn fail(
        &self,
        id: &str,
        token: u64,
        reason: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        self.fail_at(id, token, reason, retryable, Utc::now())
    }

    /// Record a failed attempt. Non-retryable failures exhaust the job at once.
    pub fn fail_at(
        &self,
        id: &str,
        token: u64,
        reason: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome, QueueError> {
        let mut inner = self.lock();
        inner.leased_entry(id, token)?;
        inner
            .record_failure(id, reason, retryable, now, self.settings.retention)
            .ok_or_else(|| QueueError::LeaseLost(id.to_string()))
    }

    pub fn reclaim_stalled(&self) -> Vec<StallOutcome> {
        self.reclaim_stalled_at(Utc::now())
    }

    /// Reclaim active jobs whose lease has expired.
    pub fn reclaim_stalled_at(&self, now: DateTime<Utc>) -> Vec<StallOutcome> {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .jobs
            .iter()
            .filter(|(_, e)| {
                e.job.state == JobState::Active
                    && e.lease.as_ref().is_some_and(|l| l.expires_at <= now)
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut outcomes = Vec::with_capacity(expired.len());
        let mut requeued = false;
        for id in expired {
            let Some(entry) = inner.jobs.get_mut(&id) else {
                continue;
            };
            // Stop the stale worker without affecting the next holder.
            entry.cancelled.store(true, Ordering::SeqCst);
            entry.cancelled = Arc::new(AtomicBool::new(false));
            entry.job.stalled_count += 1;

            let stalled_count = entry.job.stalled_count;
            if stalled_count <= self.settings.max_stalled_count {
                entry.lease = None;
                entry.job.state = JobState::Stalled;
                let weight = entry.job.priority.weight();
                let seq = entry.seq;
                let job = entry.job.clone();
                inner.ready.insert((weight, seq, id));
                outcomes.push(StallOutcome::Requeued(job));
                requeued = true;
            } else {
                let reason = format!(
                    "job stalled {} times (limit {})",
                    stalled_count, self.settings.max_stalled_count
                );
                if let Some(outcome) =
                    inner.record_failure(&id, &reason, true, now, self.settings.retention)
                {
                    outcomes.push(StallOutcome::Failed(outcome));
                }
            }
        }
        drop(inner);

        if requeued {
            self.notify.notify_one();
        }
        outcomes
    }

    /// Cancel a waiting or active job.
    pub fn cancel(&self, id: &str) -> Result<CancelOutcome, QueueError> {
        let mut inner = self.lock();
        let state = inner
            .jobs
            .get(id)
            .map(|e| e.job.state)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        match state {
            JobState::Waiting | JobState::Stalled => {
                inner.unschedule(id);
                let entry = inner
                    .jobs
                    .remove(id)
                    .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
                Ok(CancelOutcome::Removed(entry.job))
            }
            JobState::Active => {
                let entry = inner
                    .jobs
                    .remove(id)
                    .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
                entry.cancelled.store(true, Ordering::SeqCst);
                Ok(CancelOutcome::Aborted(entry.job))
            }
            JobState::Completed | JobState::Failed => Err(QueueError::InvalidState {
                id: id.to_string(),
                state,
                action: "cancel",
            }),
        }
    }

    /// Remove a completed or failed job.
    pub fn remove_job(&self, id: &str) -> Result<Job, QueueError> {
        let mut inner = self.lock();
        let state = inner
            .jobs
            .get(id)
            .map(|e| e.job.state)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        if !state.is_terminal() {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                state,
                action: "remove",
            });
        }

        inner.completed.retain(|queued| queued != id);
        inner.failed.retain(|queued| queued != id);
        inner
            .jobs
            .remove(id)
            .map(|e| e.job)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.lock().jobs.get(id).map(|e| e.job.clone())
    }

    /// All jobs currently held, in enqueue order.
    pub fn jobs(&self) -> Vec<Job> {
        let inner = self.lock();
        let mut entries: Vec<&Entry> = inner.jobs.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.job.clone()).collect()
    }

    /// Counts computed from current state.
    pub fn counts(&self) -> QueueCounts {
        let inner = self.lock();
        let mut counts = QueueCounts::default();
        for entry in inner.jobs.values() {
            match entry.job.state {
                JobState::Waiting | JobState::Stalled => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
