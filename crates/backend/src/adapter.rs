//! The backend adapter contract and the factory that selects a variant.

use std::sync::Arc;

use async_trait::async_trait;
use retouch_core::options::{ProcessingOptions, ProcessingSettings};
use retouch_core::payload::WorkflowTemplate;
use retouch_core::status::CanonicalStatus;

use crate::comfyui::ComfyUiBackend;
use crate::config::{BackendConfig, BackendKind};
use crate::deployment::DeploymentBackend;
use crate::error::BackendError;
use crate::http::HttpTransport;
use crate::job_queue::JobQueueBackend;

/// Everything a backend needs to start one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitRequest {
    /// Base64 image body, a `data:image/...;base64,` URL, or (for hosted
    /// deployments) a remote URL.
    pub image: String,
    pub options: Option<ProcessingOptions>,
    pub settings: Option<ProcessingSettings>,
    /// Use the higher-quality sampler/scheduler pair.
    pub pro_mode: bool,
}

impl SubmitRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_settings(mut self, settings: ProcessingSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn pro(mut self, pro_mode: bool) -> Self {
        self.pro_mode = pro_mode;
        self
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: CanonicalStatus,
}

/// Normalized answer to a status poll.
///
/// Image fields are `None` both while the job is running and when a
/// finished job simply has no recognizable image field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub status: CanonicalStatus,
    pub progress: Option<f64>,
    pub image_base64: Option<String>,
    pub image_url: Option<String>,
    pub delay_time: Option<f64>,
    pub execution_time: Option<f64>,
    pub error: Option<String>,
    pub job_id: Option<String>,
}

impl StatusReport {
    pub fn new(status: CanonicalStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// One backend integration.
///
/// Implementations translate non-2xx responses into
/// [`BackendError::Api`] and attach the configured bearer token to every
/// request.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, BackendError>;

    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, BackendError>;

    async fn cancel(&self, job_id: &str) -> Result<(), BackendError>;
}

/// Build the adapter selected by `config.kind`.
pub fn connect(config: &BackendConfig) -> Result<Arc<dyn BackendAdapter>, BackendError> {
    let http = HttpTransport::from_config(config)?;
    let template = match &config.workflow_template {
        Some(path) => WorkflowTemplate::from_file(path)?,
        None => WorkflowTemplate::builtin().clone(),
    };

    let adapter: Arc<dyn BackendAdapter> = match config.kind {
        BackendKind::JobQueue => Arc::new(JobQueueBackend::new(http, template)),
        BackendKind::ComfyUi => Arc::new(ComfyUiBackend::new(http, template)),
        BackendKind::Deployment => {
            let deployment_id = config
                .deployment_id
                .clone()
                .ok_or(BackendError::MissingDeploymentId)?;
            Arc::new(DeploymentBackend::new(http, deployment_id))
        }
    };

    tracing::info!(
        backend = %config.kind,
        base_url = %config.base_url,
        authenticated = config.auth_token.is_some(),
        "Backend adapter ready",
    );

    Ok(adapter)
}
