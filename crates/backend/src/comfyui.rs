//! ComfyUI workflow-graph backend.
//!
//! Talks to a ComfyUI server directly: the input image is uploaded through
//! `/upload/image`, the merged graph is queued on `/prompt`, and status is
//! derived from `/history/{prompt_id}` with `/queue` as the fallback while
//! the prompt has not finished.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use retouch_core::payload::{
    build_workflow, data_url_mime, set_input_image_name, strip_data_url_prefix, WorkflowTemplate,
};
use retouch_core::status::CanonicalStatus;
use serde::Deserialize;
use serde_json::Value;

use crate::adapter::{BackendAdapter, StatusReport, SubmitReceipt, SubmitRequest};
use crate::config::BackendKind;
use crate::error::BackendError;
use crate::extract;
use crate::http::HttpTransport;

const OP_UPLOAD: &str = "Upload";
const OP_SUBMIT: &str = "Generate";
const OP_STATUS: &str = "Status";
const OP_QUEUE: &str = "Queue";
const OP_CANCEL: &str = "Cancel";
const OP_INTERRUPT: &str = "Interrupt";

/// Response returned by `/upload/image`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
}

impl UploadResponse {
    /// The value a `LoadImage` node expects for this file.
    pub fn image_reference(&self) -> String {
        if self.subfolder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.subfolder, self.name)
        }
    }
}

/// One entry of `/history/{prompt_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// A file produced by an output node.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default = "default_image_type", rename = "type")]
    pub kind: String,
}

fn default_image_type() -> String {
    "output".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `[event_name, payload]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<(String, Value)>,
}

impl HistoryStatus {
    /// The `exception_message` of the `execution_error` event, if any.
    fn execution_error(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|(event, _)| event == "execution_error")
            .and_then(|(_, payload)| payload.get("exception_message"))
            .and_then(Value::as_str)
            .map(|msg| msg.trim().to_string())
            .filter(|msg| !msg.is_empty())
    }
}

/// Snapshot of `/queue`. Each item is `[number, prompt_id, prompt, ...]`.
#[derive(Debug, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<Vec<Value>>,
    #[serde(default)]
    pub queue_pending: Vec<Vec<Value>>,
}

impl QueueSnapshot {
    pub fn is_running(&self, prompt_id: &str) -> bool {
        Self::contains(&self.queue_running, prompt_id)
    }

    pub fn is_pending(&self, prompt_id: &str) -> bool {
        Self::contains(&self.queue_pending, prompt_id)
    }

    fn contains(items: &[Vec<Value>], prompt_id: &str) -> bool {
        items
            .iter()
            .any(|item| item.get(1).and_then(Value::as_str) == Some(prompt_id))
    }
}

/// Client for a single ComfyUI instance.
pub struct ComfyUiBackend {
    http: HttpTransport,
    template: WorkflowTemplate,
    client_id: String,
}

impl ComfyUiBackend {
    pub fn new(http: HttpTransport, template: WorkflowTemplate) -> Self {
        Self {
            http,
            template,
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Upload the input image and return the name ComfyUI stored it under.
    pub async fn upload_image(&self, image: &str) -> Result<UploadResponse, BackendError> {
        let (mime, extension) = image_mime(image);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(strip_data_url_prefix(image).trim())
            .map_err(|e| BackendError::InvalidImage(e.to_string()))?;

        let file_name = format!("retouch-{}.{extension}", uuid::Uuid::new_v4());
        let part = Part::bytes(bytes).file_name(file_name).mime_str(mime)?;
        let form = Form::new().part("image", part).text("overwrite", "true");

        let response = self
            .http
            .post(self.http.endpoint(&["upload", "image"])?)
            .multipart(form)
            .send()
            .await?;
        HttpTransport::parse_response(OP_UPLOAD, response).await
    }

    /// Retrieve execution history for one prompt. `None` until the prompt
    /// has finished executing.
    pub async fn get_history(
        &self,
        prompt_id: &str,
    ) -> Result<Option<HistoryEntry>, BackendError> {
        let response = self
            .http
            .get(self.http.endpoint(&["history", prompt_id])?)
            .send()
            .await?;
        let mut history: BTreeMap<String, HistoryEntry> =
            HttpTransport::parse_response(OP_STATUS, response).await?;
        Ok(history.remove(prompt_id))
    }

    pub async fn get_queue(&self) -> Result<QueueSnapshot, BackendError> {
        let response = self.http.get(self.http.endpoint(&["queue"])?).send().await?;
        HttpTransport::parse_response(OP_QUEUE, response).await
    }

    /// Interrupt whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), BackendError> {
        let response = self.http.post(self.http.endpoint(&["interrupt"])?).send().await?;
        HttpTransport::check_status(OP_INTERRUPT, response).await
    }

    /// `/view` URL for an output file.
    pub fn view_url(&self, image: &ImageRef) -> Result<Url, BackendError> {
        let mut url = self.http.endpoint(&["view"])?;
        url.query_pairs_mut()
            .append_pair("filename", &image.filename)
            .append_pair("subfolder", &image.subfolder)
            .append_pair("type", &image.kind);
        Ok(url)
    }

    fn report_from_history(
        &self,
        prompt_id: &str,
        entry: &HistoryEntry,
    ) -> Result<StatusReport, BackendError> {
        let status = entry.status.as_ref();
        let status_str = status.and_then(|s| s.status_str.as_deref());

        let mut report = StatusReport {
            job_id: Some(prompt_id.to_string()),
            ..Default::default()
        };

        match status_str {
            Some("error") => {
                report.status = CanonicalStatus::Error;
                report.error = status.and_then(HistoryStatus::execution_error);
            }
            Some("success") => {
                report.status = CanonicalStatus::Done;
                let first = entry.outputs.values().flat_map(|out| out.images.iter()).next();
                if let Some(image) = first {
                    report.image_url = Some(self.view_url(image)?.to_string());
                }
            }
            _ if status.is_some_and(|s| s.completed) => report.status = CanonicalStatus::Done,
            _ => report.status = CanonicalStatus::Processing,
        }

        Ok(report)
    }
}

#[async_trait]
impl BackendAdapter for ComfyUiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ComfyUi
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, BackendError> {
        let upload = self.upload_image(&request.image).await?;

        let mut workflow = build_workflow(
            &self.template,
            request.options.as_ref(),
            request.settings.as_ref(),
            request.pro_mode,
        );
        set_input_image_name(&mut workflow, &upload.image_reference());

        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });
        let response = self
            .http
            .post(self.http.endpoint(&["prompt"])?)
            .json(&body)
            .send()
            .await?;
        // `{prompt_id, number, node_errors}`
        let queued: Value = HttpTransport::parse_response(OP_SUBMIT, response).await?;
        let prompt_id = extract::string_field(&queued, "prompt_id")
            .ok_or(BackendError::MissingJobId(OP_SUBMIT))?;
        let queue_position = queued.get("number").and_then(Value::as_i64);

        tracing::info!(
            prompt_id = %prompt_id,
            queue_position,
            uploaded = %upload.name,
            "Workflow queued on ComfyUI",
        );

        Ok(SubmitReceipt {
            job_id: prompt_id,
            status: CanonicalStatus::Queued,
        })
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, BackendError> {
        if let Some(entry) = self.get_history(job_id).await? {
            return self.report_from_history(job_id, &entry);
        }

        let queue = self.get_queue().await?;
        let status = if queue.is_running(job_id) {
            CanonicalStatus::Processing
        } else if queue.is_pending(job_id) {
            CanonicalStatus::Queued
        } else {
            CanonicalStatus::Pending
        };

        tracing::debug!(prompt_id = job_id, %status, "Prompt not in history yet");
        Ok(StatusReport {
            status,
            job_id: Some(job_id.to_string()),
            ..Default::default()
        })
    }

    async fn cancel(&self, job_id: &str) -> Result<(), BackendError> {
        let running = self.get_queue().await?.is_running(job_id);

        let response = self
            .http
            .post(self.http.endpoint(&["queue"])?)
            .json(&serde_json::json!({ "delete": [job_id] }))
            .send()
            .await?;
        HttpTransport::check_status(OP_CANCEL, response).await?;

        if running {
            self.interrupt().await?;
        }

        tracing::info!(prompt_id = job_id, interrupted = running, "Prompt cancelled on ComfyUI");
        Ok(())
    }
}

/// Mime type and file extension for an image string, read from its data URL
/// prefix. Bare base64 bodies are assumed to be JPEG.
fn image_mime(image: &str) -> (&'static str, &'static str) {
    match data_url_mime(image).as_deref() {
        Some("image/png") => ("image/png", "png"),
        Some("image/webp") => ("image/webp", "webp"),
        _ => ("image/jpeg", "jpg"),
    }
}
