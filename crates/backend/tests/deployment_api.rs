//! Integration tests for the hosted deployment adapter against a stub server.

mod common;

use assert_matches::assert_matches;
use retouch_backend::{connect, BackendConfig, BackendError, BackendKind, SubmitRequest};
use retouch_core::options::{ProcessingOptions, ProcessingSettings};
use retouch_core::status::CanonicalStatus;
use serde_json::json;

use common::StubServer;

// ---------------------------------------------------------------------------
// Test: submit queues a run with the flat inputs map
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_queues_run_with_inputs() {
    let server = StubServer::start().await;
    server.respond("POST", "/api/run/deployment/queue", 200, json!({ "run_id": "run-9" }));
    let adapter = server.adapter(BackendKind::Deployment, "/api");

    let request = SubmitRequest::new("https://cdn.example.com/in.jpg")
        .with_options(ProcessingOptions::default())
        .with_settings(ProcessingSettings::default());
    let receipt = adapter.submit(&request).await.unwrap();

    assert_eq!(receipt.job_id, "run-9");
    assert_eq!(receipt.status, CanonicalStatus::Pending);

    let body = server.requests_to("/api/run/deployment/queue")[0].json();
    assert_eq!(body["deployment_id"], "dep-123");
    assert_eq!(body["inputs"]["input_image"], "https://cdn.example.com/in.jpg");
    assert_eq!(body["inputs"]["r_eye"], true);
    assert_eq!(body["inputs"]["sampling_steps"], 30);
    assert_eq!(body["inputs"]["detail_method"], "VITMatte(local)");
}

// ---------------------------------------------------------------------------
// Test: `id` is accepted when `run_id` is absent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_accepts_plain_id() {
    let server = StubServer::start().await;
    server.respond(
        "POST",
        "/run/deployment/queue",
        200,
        json!({ "id": "run-3", "status": "queued" }),
    );
    let adapter = server.adapter(BackendKind::Deployment, "");

    let receipt = adapter.submit(&SubmitRequest::new("QUJD")).await.unwrap();

    assert_eq!(receipt.job_id, "run-3");
    assert_eq!(receipt.status, CanonicalStatus::Queued);
}

// ---------------------------------------------------------------------------
// Test: run documents map through the deployment vocabulary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_status_reads_outputs() {
    let server = StubServer::start().await;
    server.respond(
        "GET",
        "/run/run-9",
        200,
        json!({
            "id": "run-9",
            "status": "success",
            "outputs": [{ "data": { "images": [{ "url": "https://cdn.example.com/out.png" }] } }],
        }),
    );
    let adapter = server.adapter(BackendKind::Deployment, "");

    let report = adapter.fetch_status("run-9").await.unwrap();

    assert_eq!(report.status, CanonicalStatus::Done);
    assert_eq!(report.image_url.as_deref(), Some("https://cdn.example.com/out.png"));
}

// ---------------------------------------------------------------------------
// Test: cancel posts to /run/{id}/cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_posts_to_run_cancel() {
    let server = StubServer::start().await;
    server.respond("POST", "/run/run-9/cancel", 200, json!({}));
    let adapter = server.adapter(BackendKind::Deployment, "");

    adapter.cancel("run-9").await.unwrap();

    assert_eq!(server.requests_to("/run/run-9/cancel").len(), 1);
}

// ---------------------------------------------------------------------------
// Test: the factory refuses a deployment config without an id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_requires_deployment_id() {
    let server = StubServer::start().await;
    let config = BackendConfig::new(BackendKind::Deployment, server.url(""));

    assert_matches!(connect(&config).err(), Some(BackendError::MissingDeploymentId));
}
