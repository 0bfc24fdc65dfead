//! API integration tests.
//!
//! Every test builds the full application graph in-process (queues, worker
//! pool, tracker, notifier) with mock renderers and webhook transport.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{TestFixture, SIGNING_SECRET, WEBHOOK_SECRET, WEBHOOK_URL};
use ticketgen_core::{
    delivery::SIGNATURE_HEADER, verify_webhook, SigningKey, TicketData, TokenSigner,
};

fn signed_token(ticket_id: &str) -> String {
    TokenSigner::new(SigningKey::new(SIGNING_SECRET))
        .sign(&TicketData::new(ticket_id, "e1", "u1"))
        .unwrap()
        .encode()
        .unwrap()
}

// =============================================================================
// Health and config
// =============================================================================

#[tokio::test]
async fn test_health_reports_running_workers() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["workers_running"], true);
}

#[tokio::test]
async fn test_config_redacts_secrets() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["signing"]["secret_configured"], true);
    assert_eq!(response.body["delivery"]["dedicated_secret_configured"], true);
    let text = response.body.to_string();
    assert!(!text.contains(SIGNING_SECRET));
    assert!(!text.contains(WEBHOOK_SECRET));
}

// =============================================================================
// Batches
// =============================================================================

#[tokio::test]
async fn test_submit_batch_completes_and_delivers() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/batches", TestFixture::batch_body(&["t1", "t2"]))
        .await;

    assert_status!(response, StatusCode::ACCEPTED);
    let job_id = response.body["jobId"].as_str().unwrap().to_string();
    let batch_id = response.body["batchId"].as_str().unwrap().to_string();
    assert_eq!(response.body["jobIds"], json!([job_id.clone()]));
    assert_eq!(response.body["estimatedDurationSeconds"], 3);

    let batch = fixture.wait_for_batch(&batch_id).await;
    assert_eq!(batch["state"], "completed");
    assert_eq!(batch["result"]["total"], 2);
    assert_eq!(batch["result"]["successful"], 2);
    assert_eq!(batch["delivery"]["outcome"], "delivered");

    let job = fixture.get(&format!("/api/v1/jobs/{job_id}")).await;
    assert_status!(job, StatusCode::OK);
    assert_eq!(job.body["state"], "completed");
    assert_eq!(job.body["attemptsMade"], 1);

    let requests = fixture.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, WEBHOOK_URL);
    let signature = requests[0].header(SIGNATURE_HEADER).unwrap();
    assert!(verify_webhook(
        &requests[0].body,
        signature,
        WEBHOOK_SECRET.as_bytes()
    ));
}

#[tokio::test]
async fn test_generated_token_validates_once() {
    let fixture = TestFixture::new().await;
    let batch_id = fixture.submit(&["t1"]).await;
    let batch = fixture.wait_for_batch(&batch_id).await;

    let token = batch["result"]["outcomes"][0]["token"].clone();
    assert!(token.is_object());

    let first = fixture
        .post("/api/v1/tokens/validate", json!({ "token": token.clone() }))
        .await;
    assert_status!(first, StatusCode::OK);
    assert_eq!(first.body["valid"], true);
    assert_eq!(first.body["ticket"]["id"], "t1");

    let second = fixture
        .post("/api/v1/tokens/validate", json!({ "token": token }))
        .await;
    assert_status!(second, StatusCode::CONFLICT);
    assert_eq!(second.body["code"], "QR_CODE_REPLAYED");
}

#[tokio::test]
async fn test_large_batch_is_split_into_jobs() {
    let fixture = TestFixture::new().await;
    let ids: Vec<String> = (0..9).map(|i| format!("t{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let response = fixture
        .post("/api/v1/batches", TestFixture::batch_body(&refs))
        .await;

    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["jobIds"].as_array().unwrap().len(), 3);

    let batch_id = response.body["batchId"].as_str().unwrap();
    let batch = fixture.wait_for_batch(batch_id).await;
    assert_eq!(batch["state"], "completed");
    assert_eq!(batch["jobsFinished"], 3);
    let outcome_ids: Vec<&str> = batch["result"]["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["ticketId"].as_str().unwrap())
        .collect();
    assert_eq!(outcome_ids, refs);
    assert_eq!(fixture.transport.requests().len(), 1);
}

#[tokio::test]
async fn test_partial_failure_is_reported() {
    let fixture = TestFixture::new().await;
    fixture.qr.fail_for("t2");

    let batch_id = fixture.submit(&["t1", "t2", "t3"]).await;
    let batch = fixture.wait_for_batch(&batch_id).await;

    assert_eq!(batch["state"], "partial");
    assert_eq!(batch["result"]["successful"], 2);
    assert_eq!(batch["result"]["failed"], 1);
    let failed = &batch["result"]["outcomes"][1];
    assert_eq!(failed["ticketId"], "t2");
    assert_eq!(failed["success"], false);
    assert!(failed["errorMessage"].as_str().unwrap().contains("t2"));
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/batches", json!({ "tickets": [] }))
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "EMPTY_BATCH");
}

#[tokio::test]
async fn test_oversized_batch_rejected() {
    let fixture = TestFixture::new().await;
    let ids: Vec<String> = (0..11).map(|i| format!("t{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let response = fixture
        .post("/api/v1/batches", TestFixture::batch_body(&refs))
        .await;

    assert_status!(response, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.body["code"], "BATCH_SIZE_EXCEEDED");
}

#[tokio::test]
async fn test_ticket_missing_fields_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/batches",
            json!({ "tickets": [{"id": "t1", "eventId": "", "userId": "u1"}] }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "INVALID_TICKET");
    assert!(response.body["error"].as_str().unwrap().contains("eventId"));
}

#[tokio::test]
async fn test_unknown_priority_rejected() {
    let fixture = TestFixture::new().await;
    let mut body = TestFixture::batch_body(&["t1"]);
    body["options"] = json!({ "priority": "urgent" });

    let response = fixture.post("/api/v1/batches", body).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "INVALID_PRIORITY");
    assert!(fixture.transport.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_batch_and_job_return_404() {
    let fixture = TestFixture::new().await;

    let batch = fixture.get("/api/v1/batches/missing").await;
    assert_status!(batch, StatusCode::NOT_FOUND);
    assert_eq!(batch.body["code"], "BATCH_NOT_FOUND");

    let job = fixture.get("/api/v1/jobs/missing").await;
    assert_status!(job, StatusCode::NOT_FOUND);
    assert_eq!(job.body["code"], "JOB_NOT_FOUND");
}

// =============================================================================
// Jobs
// =============================================================================

#[tokio::test]
async fn test_cancel_delayed_job_fails_batch() {
    let fixture = TestFixture::new().await;
    let mut body = TestFixture::batch_body(&["t1", "t2"]);
    body["options"] = json!({ "delay": 60000 });

    let submitted = fixture.post("/api/v1/batches", body).await;
    assert_status!(submitted, StatusCode::ACCEPTED);
    let job_id = submitted.body["jobId"].as_str().unwrap();
    let batch_id = submitted.body["batchId"].as_str().unwrap();

    let response = fixture.delete(&format!("/api/v1/jobs/{job_id}")).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cancelled"], true);
    assert_eq!(response.body["previousState"], "waiting");

    let batch = fixture.wait_for_batch(batch_id).await;
    assert_eq!(batch["state"], "failed");
    assert_eq!(batch["result"]["failed"], 2);
    assert_eq!(
        batch["result"]["outcomes"][0]["errorMessage"],
        "job cancelled"
    );

    let again = fixture.delete(&format!("/api/v1/jobs/{job_id}")).await;
    assert_status!(again, StatusCode::NOT_FOUND);
}

// =============================================================================
// Queues
// =============================================================================

#[tokio::test]
async fn test_queue_stats_lists_every_queue() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/queues/stats").await;

    assert_status!(response, StatusCode::OK);
    for queue in [
        "ticket-generation",
        "document-generation",
        "composite-batch",
        "dead-letter",
    ] {
        let counts = &response.body[queue];
        for field in ["waiting", "active", "completed", "failed"] {
            assert_eq!(counts[field], 0, "{queue}.{field}");
        }
    }
}

#[tokio::test]
async fn test_exhausted_job_dead_lettered_and_replayed() {
    let fixture = TestFixture::new().await;
    fixture.qr.fail_all(true);

    let submitted = fixture
        .post("/api/v1/batches", TestFixture::batch_body(&["t1"]))
        .await;
    let job_id = submitted.body["jobId"].as_str().unwrap().to_string();
    let batch_id = submitted.body["batchId"].as_str().unwrap().to_string();

    let batch = fixture.wait_for_batch(&batch_id).await;
    assert_eq!(batch["state"], "failed");

    let job = fixture.get(&format!("/api/v1/jobs/{job_id}")).await;
    assert_eq!(job.body["state"], "failed");
    assert_eq!(job.body["attemptsMade"], 3);

    let dead = fixture.get("/api/v1/queues/dead-letter").await;
    assert_status!(dead, StatusCode::OK);
    let entries = dead.body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["origin"]["jobId"], job_id.as_str());
    let entry_id = entries[0]["id"].as_str().unwrap().to_string();

    let stats = fixture.get("/api/v1/queues/stats").await;
    assert_eq!(stats.body["dead-letter"]["failed"], 1);

    fixture.qr.fail_all(false);
    let replay = fixture
        .post_empty(&format!("/api/v1/queues/dead-letter/{entry_id}/replay"))
        .await;
    assert_status!(replay, StatusCode::ACCEPTED);
    assert_eq!(replay.body["queue"], "ticket-generation");
    let replayed_id = replay.body["jobId"].as_str().unwrap();
    assert_ne!(replayed_id, job_id);

    fixture.wait_for_job_state(replayed_id, "completed").await;
    let dead = fixture.get("/api/v1/queues/dead-letter").await;
    assert!(dead.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_replay_unknown_dead_letter_returns_404() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_empty("/api/v1/queues/dead-letter/missing/replay")
        .await;

    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Tokens
// =============================================================================

#[tokio::test]
async fn test_validate_raw_token_string() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/tokens/validate",
            json!({ "token": signed_token("t9") }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["ticket"]["id"], "t9");
    assert_eq!(response.body["ticket"]["eventId"], "e1");
}

#[tokio::test]
async fn test_tampered_token_rejected() {
    let fixture = TestFixture::new().await;
    let mut token: Value = serde_json::from_str(&signed_token("t1")).unwrap();
    token["userId"] = json!("someone-else");

    let response = fixture
        .post("/api/v1/tokens/validate", json!({ "token": token }))
        .await;

    assert_status!(response, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "QR_CODE_TAMPERED");
}

#[tokio::test]
async fn test_malformed_token_rejected() {
    let fixture = TestFixture::new().await;

    let garbage = fixture
        .post("/api/v1/tokens/validate", json!({ "token": "not json" }))
        .await;
    assert_status!(garbage, StatusCode::BAD_REQUEST);
    assert_eq!(garbage.body["code"], "QR_CODE_FORMAT_ERROR");

    let missing = fixture
        .post("/api/v1/tokens/validate", json!({ "token": {"id": "t1"} }))
        .await;
    assert_status!(missing, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["code"], "INVALID_QR_DATA");
}

// =============================================================================
// Deliveries
// =============================================================================

#[tokio::test]
async fn test_failed_delivery_persisted_and_retried() {
    let fixture = TestFixture::new().await;
    fixture.transport.fail_always(true);

    let batch_id = fixture.submit(&["t1"]).await;
    let batch = fixture.wait_for_batch(&batch_id).await;
    assert_eq!(batch["state"], "completed");
    assert_eq!(batch["delivery"]["outcome"], "persisted");
    assert_eq!(fixture.transport.requests().len(), 4);

    let failed = fixture.get("/api/v1/deliveries/failed").await;
    assert_status!(failed, StatusCode::OK);
    let records = failed.body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["batchId"], batch_id.as_str());
    assert_eq!(records[0]["attempts"], 4);
    let record_id = records[0]["id"].as_str().unwrap().to_string();

    // Still failing: the attempt is counted and the record stays open.
    let retry = fixture
        .post_empty(&format!("/api/v1/deliveries/failed/{record_id}/retry"))
        .await;
    assert_status!(retry, StatusCode::BAD_GATEWAY);

    fixture.transport.fail_always(false);
    let retry = fixture
        .post_empty(&format!("/api/v1/deliveries/failed/{record_id}/retry"))
        .await;
    assert_status!(retry, StatusCode::OK);
    assert_eq!(retry.body["outcome"], "delivered");
    assert_eq!(retry.body["attempts"], 6);

    let failed = fixture.get("/api/v1/deliveries/failed").await;
    assert!(failed.body.as_array().unwrap().is_empty());

    let again = fixture
        .post_empty(&format!("/api/v1/deliveries/failed/{record_id}/retry"))
        .await;
    assert_status!(again, StatusCode::CONFLICT);
    assert_eq!(again.body["code"], "ALREADY_RESOLVED");
}

#[tokio::test]
async fn test_retry_unknown_delivery_returns_404() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_empty("/api/v1/deliveries/failed/missing/retry")
        .await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert_eq!(response.body["code"], "DELIVERY_RECORD_NOT_FOUND");
}

// =============================================================================
// Metrics
// =============================================================================

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;

    assert_status!(response, StatusCode::OK);
    let text = response.body.as_str().unwrap();
    assert!(text.contains("ticketgen_http_requests_total"));
    assert!(text.contains("ticketgen_queue_jobs"));
    assert!(text.contains("ticketgen_worker_pool_running"));
}
