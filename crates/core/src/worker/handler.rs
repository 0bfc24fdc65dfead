use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::queue::Job;

/// Failure reported by a job handler.
#[derive(Debug, Error)]
pub enum JobError {
    /// Transient failure; the job is retried per its backoff policy.
    #[error("{0}")]
    Retryable(String),

    /// The job can never succeed (bad payload, unknown type). Dead-lettered
    /// without further attempts.
    #[error("{0}")]
    Permanent(String),

    /// The handler stopped because the job was cancelled.
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// What a handler sees of the job it is running.
///
/// Handlers never mutate job metadata; they return an outcome.
#[derive(Debug, Clone)]
pub struct JobContext {
    job: Job,
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    pub fn new(job: Job, cancelled: Arc<AtomicBool>) -> Self {
        Self { job, cancelled }
    }

    /// Context that is never cancelled.
    pub fn detached(job: Job) -> Self {
        Self::new(job, Arc::new(AtomicBool::new(false)))
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn payload(&self) -> &Value {
        &self.job.payload
    }

    /// 1-based number of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.job.attempts_made + 1
    }

    /// Set when the job was cancelled or its lease was lost. Handlers should
    /// stop at the next safe point.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Executes jobs of one type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Job type this handler is registered under.
    fn job_type(&self) -> &str;

    /// Run the job. The returned value is stored as the job's result.
    async fn handle(&self, ctx: &JobContext) -> Result<Value, JobError>;
}

/// Job type → handler lookup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.job_type().to_string(), handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl JobHandler for Echo {
        fn job_type(&self) -> &str {
            "echo"
        }

        async fn handle(&self, ctx: &JobContext) -> Result<Value, JobError> {
            Ok(ctx.payload().clone())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = HandlerRegistry::new().with_handler(Arc::new(Echo));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("other").is_none());
        assert_eq!(registry.job_types(), vec!["echo".to_string()]);
    }

    #[test]
    fn test_job_error_retryability() {
        assert!(JobError::retryable("timeout").is_retryable());
        assert!(!JobError::permanent("bad payload").is_retryable());
        assert!(!JobError::Cancelled.is_retryable());
        assert_eq!(JobError::retryable("timeout").to_string(), "timeout");
    }

    #[tokio::test]
    async fn test_context_exposes_payload_and_cancel_flag() {
        let job = crate::testing::fixtures::job("echo", json!({"x": 1}));
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = JobContext::new(job, Arc::clone(&flag));

        assert_eq!(ctx.attempt(), 1);
        assert_eq!(Echo.handle(&ctx).await.unwrap(), json!({"x": 1}));
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }
}
