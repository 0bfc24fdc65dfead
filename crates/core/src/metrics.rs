//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job queues and workers (processed, duration, stalls, dead-lettering)
//! - Ticket tokens (signing, validation results)
//! - Generation and result delivery

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs processed by queue and result.
pub static JOBS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketgen_jobs_processed_total", "Total jobs processed"),
        &["queue", "result"], // "completed", "retried", "failed"
    )
    .unwrap()
});

/// Handler run time per attempt.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ticketgen_job_duration_seconds",
            "Duration of one job attempt",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["queue"],
    )
    .unwrap()
});

pub static JOBS_DEAD_LETTERED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketgen_jobs_dead_lettered_total",
            "Jobs moved to the dead-letter queue",
        ),
        &["queue"],
    )
    .unwrap()
});

/// Expired leases reclaimed by the stall monitor.
pub static JOBS_STALLED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketgen_jobs_stalled_total", "Jobs reclaimed after a stall"),
        &["queue"],
    )
    .unwrap()
});

// =============================================================================
// Tokens
// =============================================================================

pub static TOKENS_SIGNED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticketgen_tokens_signed_total", "Ticket tokens signed").unwrap()
});

/// Validation results.
pub static TOKEN_VALIDATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketgen_token_validations_total",
            "Ticket token validations by result",
        ),
        // "valid", "invalid", "tampered", "expired", "replayed",
        // "store_unavailable", "fail_open", "error"
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Generation and delivery
// =============================================================================

pub static TICKETS_GENERATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketgen_tickets_generated_total",
            "Tickets processed by generation jobs",
        ),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

pub static WEBHOOK_DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketgen_webhook_deliveries_total",
            "Batch result notifications by outcome",
        ),
        &["result"], // "delivered", "persisted", "skipped", "redelivered"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(JOBS_DEAD_LETTERED.clone()),
        Box::new(JOBS_STALLED.clone()),
        // Tokens
        Box::new(TOKENS_SIGNED.clone()),
        Box::new(TOKEN_VALIDATIONS.clone()),
        // Generation and delivery
        Box::new(TICKETS_GENERATED.clone()),
        Box::new(WEBHOOK_DELIVERIES.clone()),
    ]
}
