//! Integration tests for the ComfyUI adapter against a stub server.

mod common;

use assert_matches::assert_matches;
use retouch_backend::{BackendError, BackendKind, SubmitRequest};
use retouch_core::status::CanonicalStatus;
use serde_json::json;

use common::StubServer;

// ---------------------------------------------------------------------------
// Test: submit uploads the image, then queues the graph pointing at it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_uploads_then_queues_prompt() {
    let server = StubServer::start().await;
    server.respond(
        "POST",
        "/upload/image",
        200,
        json!({ "name": "retouch-1.png", "subfolder": "", "type": "input" }),
    );
    server.respond(
        "POST",
        "/prompt",
        200,
        json!({ "prompt_id": "p-1", "number": 4, "node_errors": {} }),
    );
    let adapter = server.adapter(BackendKind::ComfyUi, "");

    // "QUJD" decodes to "ABC"
    let receipt = adapter
        .submit(&SubmitRequest::new("data:image/png;base64,QUJD").pro(true))
        .await
        .unwrap();

    assert_eq!(receipt.job_id, "p-1");
    assert_eq!(receipt.status, CanonicalStatus::Queued);

    let upload = &server.requests_to("/upload/image")[0];
    assert!(upload
        .content_type
        .as_deref()
        .unwrap()
        .starts_with("multipart/form-data"));
    let upload_body = upload.body_text();
    assert!(upload_body.contains("name=\"overwrite\""));
    assert!(upload_body.contains("image/png"));
    assert!(upload_body.contains("ABC"));

    let prompt = server.requests_to("/prompt")[0].json();
    assert_eq!(prompt["prompt"]["36"]["inputs"]["image"], "retouch-1.png");
    assert_eq!(prompt["prompt"]["52"]["inputs"]["sampler_name"], "res_multistep_ancestral");
    assert!(prompt["client_id"].as_str().is_some_and(|id| !id.is_empty()));
}

// ---------------------------------------------------------------------------
// Test: an undecodable image is rejected before any request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_base64_is_rejected_locally() {
    let server = StubServer::start().await;
    let adapter = server.adapter(BackendKind::ComfyUi, "");

    let err = adapter.submit(&SubmitRequest::new("not base64!")).await.unwrap_err();

    assert_matches!(err, BackendError::InvalidImage(_));
    assert!(server.requests().is_empty());
}

// ---------------------------------------------------------------------------
// Test: a prompt response without prompt_id is a missing-id error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prompt_without_id_fails() {
    let server = StubServer::start().await;
    server.respond("POST", "/upload/image", 200, json!({ "name": "x.jpg" }));
    server.respond("POST", "/prompt", 200, json!({ "number": 1 }));
    let adapter = server.adapter(BackendKind::ComfyUi, "");

    let err = adapter.submit(&SubmitRequest::new("QUJD")).await.unwrap_err();

    assert_matches!(err, BackendError::MissingJobId("Generate"));
}

// ---------------------------------------------------------------------------
// Test: successful history entry maps to done with a /view URL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_success_yields_view_url() {
    let server = StubServer::start().await;
    server.respond(
        "GET",
        "/history/p-1",
        200,
        json!({
            "p-1": {
                "outputs": {
                    "54": { "images": [{ "filename": "out 1.png", "subfolder": "", "type": "output" }] },
                },
                "status": { "status_str": "success", "completed": true, "messages": [] },
            },
        }),
    );
    let adapter = server.adapter(BackendKind::ComfyUi, "");

    let report = adapter.fetch_status("p-1").await.unwrap();

    assert_eq!(report.status, CanonicalStatus::Done);
    let url = report.image_url.unwrap();
    assert!(url.ends_with("/view?filename=out+1.png&subfolder=&type=output"), "{url}");
    assert!(server.requests_to("/queue").is_empty());
}

// ---------------------------------------------------------------------------
// Test: execution errors carry the exception message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_error_carries_exception_message() {
    let server = StubServer::start().await;
    server.respond(
        "GET",
        "/history/p-1",
        200,
        json!({
            "p-1": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [["execution_error", { "exception_message": "oom" }]],
                },
            },
        }),
    );
    let adapter = server.adapter(BackendKind::ComfyUi, "");

    let report = adapter.fetch_status("p-1").await.unwrap();

    assert_eq!(report.status, CanonicalStatus::Error);
    assert_eq!(report.error.as_deref(), Some("oom"));
}

// ---------------------------------------------------------------------------
// Test: without history the queue decides between processing and queued
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_fallback_while_not_in_history() {
    let server = StubServer::start().await;
    server.respond("GET", "/history/p-run", 200, json!({}));
    server.respond("GET", "/history/p-wait", 200, json!({}));
    server.respond("GET", "/history/p-lost", 200, json!({}));
    server.respond(
        "GET",
        "/queue",
        200,
        json!({
            "queue_running": [[1, "p-run", {}, {}, []]],
            "queue_pending": [[2, "p-wait", {}, {}, []]],
        }),
    );
    let adapter = server.adapter(BackendKind::ComfyUi, "");

    assert_eq!(adapter.fetch_status("p-run").await.unwrap().status, CanonicalStatus::Processing);
    assert_eq!(adapter.fetch_status("p-wait").await.unwrap().status, CanonicalStatus::Queued);
    assert_eq!(adapter.fetch_status("p-lost").await.unwrap().status, CanonicalStatus::Pending);
}

// ---------------------------------------------------------------------------
// Test: cancel interrupts only when the prompt is the running one
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_interrupts_only_running_prompt() {
    let server = StubServer::start().await;
    server.respond(
        "GET",
        "/queue",
        200,
        json!({ "queue_running": [[1, "p-run", {}, {}, []]], "queue_pending": [] }),
    );
    server.respond("POST", "/queue", 200, json!({}));
    server.respond("POST", "/interrupt", 200, json!({}));
    let adapter = server.adapter(BackendKind::ComfyUi, "");

    adapter.cancel("p-wait").await.unwrap();
    assert!(server.requests_to("/interrupt").is_empty());

    adapter.cancel("p-run").await.unwrap();
    assert_eq!(server.requests_to("/interrupt").len(), 1);

    let deletes: Vec<_> = server
        .requests_to("/queue")
        .into_iter()
        .filter(|r| r.method == "POST")
        .map(|r| r.json())
        .collect();
    assert_eq!(deletes, vec![json!({ "delete": ["p-wait"] }), json!({ "delete": ["p-run"] })]);
}
