//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the full application graph
//! in-process with mock renderers and a mock webhook transport, and drives it
//! through the axum router without binding a socket.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use ticketgen_core::{
    load_config_from_str,
    testing::{MemoryArtifactStore, MockDocumentRenderer, MockQrRenderer, MockWebhookTransport},
    InMemoryNonceStore, SqliteDeliveryFailureStore,
};
use ticketgen_server::app::{build_state_with_pool, Collaborators};
use ticketgen_server::state::AppState;

pub const SIGNING_SECRET: &str = "test-signing-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const WEBHOOK_URL: &str = "https://requester.test/hooks/tickets";

const TEST_CONFIG: &str = r#"
[signing]
secret = "test-signing-secret"
nonce_store = "memory"

[queues]
backoff_base_ms = 10
default_attempts = 3

[dispatcher]
max_batch_size = 10
max_tickets_per_job = 4

[delivery]
webhook_url = "https://requester.test/hooks/tickets"
secret = "test-webhook-secret"
retry_delays_ms = [5, 5, 5]
"#;

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process server with controllable mocks for:
/// - QR rendering (MockQrRenderer)
/// - Webhook delivery (MockWebhookTransport)
///
/// The worker pool is started with short poll intervals so batches finish
/// within a few hundred milliseconds.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    pub qr: Arc<MockQrRenderer>,
    pub transport: Arc<MockWebhookTransport>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let config = load_config_from_str(TEST_CONFIG).expect("test config");

        let qr = Arc::new(MockQrRenderer::new());
        let transport = Arc::new(MockWebhookTransport::new());
        let collaborators = Collaborators {
            nonce_store: Arc::new(InMemoryNonceStore::new()),
            failure_store: Arc::new(
                SqliteDeliveryFailureStore::in_memory().expect("Failed to create delivery store"),
            ),
            transport: transport.clone(),
            qr_renderer: qr.clone(),
            document_renderer: Arc::new(MockDocumentRenderer::new()),
            artifacts: Arc::new(MemoryArtifactStore::new()),
        };

        let state = build_state_with_pool(config, collaborators, |pool| {
            ticketgen_core::worker::WorkerPoolConfig {
                poll_interval: Duration::from_millis(20),
                stall_check_interval: Duration::from_millis(50),
                ..pool
            }
        });
        state.pool().start();

        let router = ticketgen_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            qr,
            transport,
        }
    }

    /// Batch request body with one ticket per id.
    pub fn batch_body(ids: &[&str]) -> Value {
        let tickets: Vec<Value> = ids
            .iter()
            .map(|id| json!({"id": id, "eventId": "e1", "userId": format!("u-{id}")}))
            .collect();
        json!({
            "tickets": tickets,
            "event": {"id": "e1", "name": "Launch Night"},
        })
    }

    /// Submit a batch and return its batch id.
    pub async fn submit(&self, ids: &[&str]) -> String {
        let response = self.post("/api/v1/batches", Self::batch_body(ids)).await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "{}", response.body);
        response.body["batchId"]
            .as_str()
            .expect("batchId")
            .to_string()
    }

    /// Poll batch progress until the batch is finished and delivery settled.
    pub async fn wait_for_batch(&self, batch_id: &str) -> Value {
        let path = format!("/api/v1/batches/{batch_id}");
        for _ in 0..250 {
            let response = self.get(&path).await;
            let body = response.body;
            if body["state"] != "processing" && !body["delivery"].is_null() {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("batch {batch_id} did not finish");
    }

    /// Poll a job until it reaches `state`.
    pub async fn wait_for_job_state(&self, job_id: &str, state: &str) -> Value {
        let path = format!("/api/v1/jobs/{job_id}");
        for _ in 0..250 {
            let response = self.get(&path).await;
            if response.body["state"] == state {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} never reached state {state}");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        // Non-JSON bodies (metrics) come back as a string.
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body_bytes).into_owned())
            })
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
