//! Hosted deployment backend.
//!
//! The workflow lives on the hosting side; requests only carry a flat map
//! of named inputs keyed to a deployment id.

use async_trait::async_trait;
use retouch_core::payload::build_deployment_inputs;
use retouch_core::status::map_deployment_status;
use serde_json::Value;

use crate::adapter::{BackendAdapter, StatusReport, SubmitReceipt, SubmitRequest};
use crate::config::BackendKind;
use crate::error::BackendError;
use crate::extract;
use crate::http::HttpTransport;

const OP_SUBMIT: &str = "Generate";
const OP_STATUS: &str = "Status";
const OP_CANCEL: &str = "Cancel";

pub struct DeploymentBackend {
    http: HttpTransport,
    deployment_id: String,
}

impl DeploymentBackend {
    pub fn new(http: HttpTransport, deployment_id: String) -> Self {
        Self {
            http,
            deployment_id,
        }
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }
}

#[async_trait]
impl BackendAdapter for DeploymentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Deployment
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, BackendError> {
        let inputs = build_deployment_inputs(
            &request.image,
            request.options.as_ref(),
            request.settings.as_ref(),
        );
        let body = serde_json::json!({
            "deployment_id": self.deployment_id,
            "inputs": inputs,
        });

        let response = self
            .http
            .post(self.http.endpoint(&["run", "deployment", "queue"])?)
            .json(&body)
            .send()
            .await?;
        let body: Value = HttpTransport::parse_response(OP_SUBMIT, response).await?;

        let job_id = extract::string_field(&body, "run_id")
            .or_else(|| extract::string_field(&body, "id"))
            .ok_or(BackendError::MissingJobId(OP_SUBMIT))?;
        let status = map_deployment_status(body.get("status").and_then(Value::as_str));

        tracing::info!(
            run_id = %job_id,
            deployment_id = %self.deployment_id,
            "Deployment run queued",
        );

        Ok(SubmitReceipt { job_id, status })
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, BackendError> {
        let response = self
            .http
            .get(self.http.endpoint(&["run", job_id])?)
            .send()
            .await?;
        let body: Value = HttpTransport::parse_response(OP_STATUS, response).await?;

        let report = parse_run_document(&body);
        tracing::debug!(run_id = job_id, status = %report.status, "Polled deployment run");
        Ok(report)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.http.endpoint(&["run", job_id, "cancel"])?)
            .send()
            .await?;
        HttpTransport::check_status(OP_CANCEL, response).await?;

        tracing::info!(run_id = job_id, "Deployment run cancelled");
        Ok(())
    }
}

/// Normalize a `/run/{id}` document.
pub fn parse_run_document(body: &Value) -> StatusReport {
    StatusReport {
        status: map_deployment_status(body.get("status").and_then(Value::as_str)),
        // Hosted runs report progress as a 0..1 fraction.
        progress: extract::number_field(body, "progress").map(|p| p * 100.0),
        image_base64: None,
        image_url: first_output_url(body),
        delay_time: None,
        execution_time: None,
        error: extract::string_field(body, "error")
            .or_else(|| extract::string_field(body, "error_message")),
        job_id: extract::string_field(body, "id"),
    }
}

/// `outputs[*].data.images[*].url`, first non-empty wins.
fn first_output_url(body: &Value) -> Option<String> {
    body.get("outputs")?
        .as_array()?
        .iter()
        .filter_map(|output| output.get("data")?.get("images")?.as_array())
        .flatten()
        .find_map(|image| extract::string_field(image, "url"))
}

#[cfg(test)]
mod tests {
    use retouch_core::status::CanonicalStatus;
    use serde_json::json;

    use super::*;

    #[test]
    fn successful_run_yields_first_image_url() {
        let report = parse_run_document(&json!({
            "id": "run-1",
            "status": "success",
            "progress": 0.5,
            "outputs": [
                { "data": { "text": ["ignored"] } },
                { "data": { "images": [{ "url": "" }, { "url": "https://cdn/out.png" }] } },
            ],
        }));
        assert_eq!(report.status, CanonicalStatus::Done);
        assert_eq!(report.progress, Some(50.0));
        assert_eq!(report.image_url.as_deref(), Some("https://cdn/out.png"));
        assert_eq!(report.image_base64, None);
        assert_eq!(report.job_id.as_deref(), Some("run-1"));
    }

    #[test]
    fn error_message_falls_back_to_error_message_field() {
        let report = parse_run_document(&json!({
            "status": "failed",
            "error_message": "node 52 crashed",
        }));
        assert_eq!(report.status, CanonicalStatus::Error);
        assert_eq!(report.error.as_deref(), Some("node 52 crashed"));
    }

    #[test]
    fn running_without_outputs() {
        let report = parse_run_document(&json!({ "status": "running", "outputs": [] }));
        assert_eq!(report.status, CanonicalStatus::Processing);
        assert_eq!(report.image_url, None);
    }
}
