use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QueueError;

/// Named queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    TicketGeneration,
    DocumentGeneration,
    CompositeBatch,
    DeadLetter,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::TicketGeneration,
        QueueName::DocumentGeneration,
        QueueName::CompositeBatch,
        QueueName::DeadLetter,
    ];

    /// Queues drained by workers.
    pub const WORKER_QUEUES: [QueueName; 3] = [
        QueueName::TicketGeneration,
        QueueName::DocumentGeneration,
        QueueName::CompositeBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::TicketGeneration => "ticket-generation",
            QueueName::DocumentGeneration => "document-generation",
            QueueName::CompositeBatch => "composite-batch",
            QueueName::DeadLetter => "dead-letter",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| QueueError::UnknownQueue(s.to_string()))
    }
}

/// Job priority. Lower weight is dequeued first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    pub fn weight(self) -> u8 {
        match self {
            JobPriority::Critical => 0,
            JobPriority::High => 2,
            JobPriority::Normal => 5,
            JobPriority::Low => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Critical => "critical",
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }
}

impl FromStr for JobPriority {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(JobPriority::Critical),
            "high" => Ok(JobPriority::High),
            "normal" => Ok(JobPriority::Normal),
            "low" => Ok(JobPriority::Low),
            other => Err(QueueError::InvalidPriority(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    /// Reclaimed from a worker that stopped heartbeating. Dequeued like `Waiting`.
    Stalled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Stalled => "stalled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bound for a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Exponential retry backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2000,
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `attempts_made` failures.
    ///
    /// `base * multiplier^(attempts_made - 1)`, capped at one hour.
    pub fn delay_for_attempt(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= MAX_BACKOFF.as_millis() as f64 {
            return MAX_BACKOFF;
        }
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// Where a dead-letter entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOrigin {
    pub queue: QueueName,
    pub job_id: String,
}

/// Per-job scheduling options.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub priority: JobPriority,
    /// Earliest dequeue is deferred by this much.
    pub delay: Option<Duration>,
    pub attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: JobPriority::Normal,
            delay: None,
            attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl JobOptions {
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// A unit of work.
///
/// Only the queue mutates jobs; handlers see a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub queue: QueueName,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: Value,
    pub priority: JobPriority,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub stalled_count: u32,
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be dequeued.
    pub available_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    pub return_value: Option<Value>,
    /// Set on dead-letter entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<JobOrigin>,
}

/// Job status as reported to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: String,
    pub queue: QueueName,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobStatus {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            queue: job.queue,
            state: job.state,
            attempts_made: job.attempts_made,
            max_attempts: job.max_attempts,
            failed_reason: job.failed_reason.clone(),
            processed_at: job.processed_at,
            finished_at: job.finished_at,
        }
    }
}

/// Per-queue job counts. `waiting` includes delayed and stalled jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

pub type QueueStats = BTreeMap<QueueName, QueueCounts>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_weights_ordered() {
        assert!(JobPriority::Critical.weight() < JobPriority::High.weight());
        assert!(JobPriority::High.weight() < JobPriority::Normal.weight());
        assert!(JobPriority::Normal.weight() < JobPriority::Low.weight());
        assert_eq!(JobPriority::Low.weight(), 10);
    }

    #[test]
    fn test_priority_rejects_unknown() {
        assert_eq!("high".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert!(matches!(
            "urgent".parse::<JobPriority>(),
            Err(QueueError::InvalidPriority(_))
        ));
        assert!(serde_json::from_str::<JobPriority>("\"urgent\"").is_err());
    }

    #[test]
    fn test_queue_name_roundtrip() {
        for queue in QueueName::ALL {
            assert_eq!(queue.as_str().parse::<QueueName>().unwrap(), queue);
            assert_eq!(
                serde_json::to_string(&queue).unwrap(),
                format!("\"{}\"", queue.as_str())
            );
        }
        assert!("default".parse::<QueueName>().is_err());
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay_for_attempt(200), MAX_BACKOFF);
    }

    #[test]
    fn test_stats_serialize_with_queue_names() {
        let mut stats = QueueStats::new();
        stats.insert(QueueName::DeadLetter, QueueCounts::default());
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("dead-letter").is_some());
    }
}
