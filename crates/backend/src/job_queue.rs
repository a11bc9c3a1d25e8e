//! Job-queue backend: `POST /run`, `GET /status/{id}`, `POST /cancel/{id}`.

use async_trait::async_trait;
use retouch_core::payload::{build_payload, WorkflowTemplate};
use retouch_core::status::map_status;
use serde_json::Value;

use crate::adapter::{BackendAdapter, StatusReport, SubmitReceipt, SubmitRequest};
use crate::config::BackendKind;
use crate::error::BackendError;
use crate::extract;
use crate::http::HttpTransport;

const OP_SUBMIT: &str = "Generate";
const OP_STATUS: &str = "Status";
const OP_CANCEL: &str = "Cancel";

/// Client for a serverless job queue fronting the workflow runner.
pub struct JobQueueBackend {
    http: HttpTransport,
    template: WorkflowTemplate,
}

impl JobQueueBackend {
    pub fn new(http: HttpTransport, template: WorkflowTemplate) -> Self {
        Self { http, template }
    }
}

#[async_trait]
impl BackendAdapter for JobQueueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::JobQueue
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, BackendError> {
        let payload = build_payload(
            &self.template,
            &request.image,
            request.options.as_ref(),
            request.settings.as_ref(),
            request.pro_mode,
        );

        let response = self
            .http
            .post(self.http.endpoint(&["run"])?)
            .json(&payload)
            .send()
            .await?;
        let body: Value = HttpTransport::parse_response(OP_SUBMIT, response).await?;

        let job_id =
            extract::string_field(&body, "id").ok_or(BackendError::MissingJobId(OP_SUBMIT))?;
        let status = map_status(body.get("status").and_then(Value::as_str));

        tracing::info!(job_id = %job_id, %status, pro_mode = request.pro_mode, "Job submitted");

        Ok(SubmitReceipt { job_id, status })
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, BackendError> {
        let response = self
            .http
            .get(self.http.endpoint(&["status", job_id])?)
            .send()
            .await?;
        let body: Value = HttpTransport::parse_response(OP_STATUS, response).await?;

        let report = parse_status_document(&body);
        tracing::debug!(job_id, status = %report.status, "Polled job status");
        Ok(report)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.http.endpoint(&["cancel", job_id])?)
            .send()
            .await?;
        HttpTransport::check_status(OP_CANCEL, response).await?;

        tracing::info!(job_id, "Job cancelled on backend");
        Ok(())
    }
}

/// Normalize a `/status/{id}` document.
pub fn parse_status_document(body: &Value) -> StatusReport {
    StatusReport {
        status: map_status(body.get("status").and_then(Value::as_str)),
        progress: extract::number_field(body, "progress"),
        image_base64: extract::image_base64(body),
        image_url: extract::image_url(body),
        delay_time: extract::number_field(body, "delayTime"),
        execution_time: extract::number_field(body, "executionTime"),
        error: extract::string_field(body, "error"),
        job_id: extract::string_field(body, "id"),
    }
}
