//! Mock webhook transport.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::delivery::{TransportError, WebhookRequest, WebhookTransport};

/// Records every request and fails on demand.
///
/// Failures are checked in order: `fail_with_status`, `fail_always`, then the
/// `fail_next` countdown. Otherwise the request succeeds with 200.
#[derive(Debug, Default)]
pub struct MockWebhookTransport {
    requests: Mutex<Vec<WebhookRequest>>,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    fail_status: AtomicU16,
}

impl MockWebhookTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time out the next `count` requests.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Answer every request with `status`.
    pub fn fail_with_status(&self, status: u16) {
        self.fail_status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl WebhookTransport for MockWebhookTransport {
    async fn send(&self, request: &WebhookRequest) -> Result<u16, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let status = self.fail_status.load(Ordering::SeqCst);
        if status != 0 {
            return Err(TransportError::Status {
                status,
                body: "mock status".to_string(),
            });
        }
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Timeout);
        }
        Ok(200)
    }
}
