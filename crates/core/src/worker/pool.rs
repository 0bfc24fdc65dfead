use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::handler::{HandlerRegistry, JobContext, JobError};
use super::observer::{JobObserver, ObserverSet};
use crate::metrics;
use crate::queue::{FailOutcome, Lease, QueueError, QueueName, QueueRegistry, StallOutcome};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub ticket_generation_concurrency: usize,
    pub document_generation_concurrency: usize,
    pub composite_batch_concurrency: usize,
    /// Fallback wake-up when no enqueue notification arrives (delayed jobs).
    pub poll_interval: Duration,
    pub stall_check_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            ticket_generation_concurrency: 5,
            document_generation_concurrency: 3,
            composite_batch_concurrency: 2,
            poll_interval: Duration::from_secs(1),
            stall_check_interval: Duration::from_secs(5),
        }
    }
}

impl WorkerPoolConfig {
    /// Number of consumers for a queue. The dead-letter queue has none.
    pub fn concurrency(&self, queue: QueueName) -> usize {
        match queue {
            QueueName::TicketGeneration => self.ticket_generation_concurrency,
            QueueName::DocumentGeneration => self.document_generation_concurrency,
            QueueName::CompositeBatch => self.composite_batch_concurrency,
            QueueName::DeadLetter => 0,
        }
    }
}

#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

impl PoolStats {
    fn to_status(&self, queue: QueueName, workers: usize) -> QueuePoolStatus {
        QueuePoolStatus {
            queue,
            workers,
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuePoolStatus {
    pub queue: QueueName,
    pub workers: usize,
    pub active_jobs: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub running: bool,
    pub queues: Vec<QueuePoolStatus>,
}

/// Everything a consumer task needs.
#[derive(Clone)]
struct Worker {
    queue: QueueName,
    registry: Arc<QueueRegistry>,
    handlers: Arc<HandlerRegistry>,
    observers: Arc<ObserverSet>,
    stats: Arc<PoolStats>,
}

/// Per-queue bounded consumers plus a stall monitor.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    registry: Arc<QueueRegistry>,
    handlers: Arc<HandlerRegistry>,
    observers: Arc<ObserverSet>,
    stats: [Arc<PoolStats>; 3],
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        registry: Arc<QueueRegistry>,
        handlers: Arc<HandlerRegistry>,
        observers: Arc<ObserverSet>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry,
            handlers,
            observers,
            stats: Default::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn stats_for(&self, queue: QueueName) -> Option<&Arc<PoolStats>> {
        QueueName::WORKER_QUEUES
            .iter()
            .position(|q| *q == queue)
            .map(|idx| &self.stats[idx])
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn consumer tasks and the stall monitor.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for queue in QueueName::WORKER_QUEUES {
            let Some(stats) = self.stats_for(queue) else {
                continue;
            };
            let workers = self.config.concurrency(queue);
            for index in 0..workers {
                let worker = Worker {
                    queue,
                    registry: Arc::clone(&self.registry),
                    handlers: Arc::clone(&self.handlers),
                    observers: Arc::clone(&self.observers),
                    stats: Arc::clone(stats),
                };
                tasks.push(self.spawn_consumer(worker, index));
            }
            info!(queue = %queue, workers, "Queue consumers started");
        }
        tasks.push(self.spawn_stall_monitor());
        info!("Worker pool started");
    }

    /// Stop claiming new jobs and wait for in-flight jobs to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *tasks)
        };
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            running: self.is_running(),
            queues: QueueName::WORKER_QUEUES
                .iter()
                .zip(self.stats.iter())
                .map(|(queue, stats)| stats.to_status(*queue, self.config.concurrency(*queue)))
                .collect(),
        }
    }

    fn spawn_consumer(&self, worker: Worker, index: usize) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let poll_interval = self.config.poll_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(queue = %worker.queue, index, "Consumer started");
            let queue = Arc::clone(worker.registry.queue(worker.queue));
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if let Some(lease) = queue.try_dequeue() {
                    worker.process(lease).await;
                    continue;
                }
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = queue.notifier().notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            debug!(queue = %worker.queue, index, "Consumer stopped");
        })
    }

    fn spawn_stall_monitor(&self) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let registry = Arc::clone(&self.registry);
        let observers = Arc::clone(&self.observers);
        let interval = self.config.stall_check_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        for queue in QueueName::WORKER_QUEUES {
                            for outcome in registry.reclaim_stalled(queue) {
                                match outcome {
                                    StallOutcome::Requeued(job) => observers.on_stalled(&job),
                                    StallOutcome::Failed(FailOutcome::Retrying { job, delay }) => {
                                        observers.on_retry_scheduled(&job, delay)
                                    }
                                    StallOutcome::Failed(FailOutcome::Exhausted { job }) => {
                                        observers.on_failed(&job)
                                    }
                                }
                            }
                        }
                    }
                }
            }
            debug!("Stall monitor stopped");
        })
    }
}

impl Worker {
    async fn process(&self, lease: Lease) {
        let queue_label = self.queue.as_str();
        let job_id = lease.job.id.clone();
        let token = lease.token;

        let Some(handler) = self.handlers.get(&lease.job.job_type) else {
            let err = JobError::permanent(format!(
                "no handler registered for job type '{}'",
                lease.job.job_type
            ));
            self.record_failure(&job_id, token, &err);
            return;
        };

        debug!(job_id = %job_id, queue = queue_label, attempt = lease.job.attempts_made + 1, "Processing job");
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let ctx = JobContext::new(lease.job.clone(), lease.cancel_flag());
        let queue = self.registry.queue(self.queue);
        let heartbeat_every = queue.settings().lease_duration / 2;
        let result = {
            let handle = handler.handle(&ctx);
            tokio::pin!(handle);
            let mut ticker = tokio::time::interval(heartbeat_every.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    result = &mut handle => break result,
                    _ = ticker.tick() => {
                        if let Err(e) = queue.heartbeat(&job_id, token) {
                            debug!(job_id = %job_id, error = %e, "Heartbeat rejected");
                        }
                    }
                }
            }
        };

        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        metrics::JOB_DURATION
            .with_label_values(&[queue_label])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => match self.registry.complete(self.queue, &job_id, token, value) {
                Ok(job) => {
                    self.stats.total_processed.fetch_add(1, Ordering::Relaxed);
                    metrics::JOBS_PROCESSED
                        .with_label_values(&[queue_label, "completed"])
                        .inc();
                    info!(job_id = %job_id, queue = queue_label, "Job completed");
                    self.observers.on_completed(&job);
                }
                Err(QueueError::LeaseLost(_)) => {
                    warn!(job_id = %job_id, queue = queue_label, "Lease lost before completion, result discarded");
                }
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to record completion"),
            },
            Err(err) => self.record_failure(&job_id, token, &err),
        }
    }

    fn record_failure(&self, job_id: &str, token: u64, err: &JobError) {
        let queue_label = self.queue.as_str();
        match self
            .registry
            .fail(self.queue, job_id, token, &err.to_string(), err.is_retryable())
        {
            Ok(FailOutcome::Retrying { job, delay }) => {
                metrics::JOBS_PROCESSED
                    .with_label_values(&[queue_label, "retried"])
                    .inc();
                warn!(
                    job_id = %job_id,
                    queue = queue_label,
                    attempt = job.attempts_made,
                    max_attempts = job.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Job failed, retry scheduled"
                );
                self.observers.on_retry_scheduled(&job, delay);
            }
            Ok(FailOutcome::Exhausted { job }) => {
                self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                metrics::JOBS_PROCESSED
                    .with_label_values(&[queue_label, "failed"])
                    .inc();
                error!(
                    job_id = %job_id,
                    queue = queue_label,
                    attempts = job.attempts_made,
                    error = %err,
                    "Job failed permanently"
                );
                self.observers.on_failed(&job);
            }
            Err(QueueError::LeaseLost(_)) => {
                debug!(job_id = %job_id, error = %err, "Lease lost, failure discarded");
            }
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to record failure"),
        }
    }
}
