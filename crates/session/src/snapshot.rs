//! Observable controller state.

use std::fmt;

use chrono::Utc;
use retouch_core::status::CanonicalStatus;
use retouch_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// Lifecycle of the controller's current job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    #[default]
    Idle,
    Submitting,
    Pending,
    Queued,
    Processing,
    Done,
    Error,
    Cancelled,
}

impl ControllerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Submitting => "submitting",
            ControllerState::Pending => "pending",
            ControllerState::Queued => "queued",
            ControllerState::Processing => "processing",
            ControllerState::Done => "done",
            ControllerState::Error => "error",
            ControllerState::Cancelled => "cancelled",
        }
    }

    /// A job is in flight on the backend.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ControllerState::Pending | ControllerState::Queued | ControllerState::Processing
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ControllerState::Done | ControllerState::Error | ControllerState::Cancelled
        )
    }

    /// States in which the synthetic progress timer advances.
    pub fn advances_progress(self) -> bool {
        matches!(self, ControllerState::Queued | ControllerState::Processing)
    }
}

impl From<CanonicalStatus> for ControllerState {
    fn from(status: CanonicalStatus) -> Self {
        match status {
            CanonicalStatus::Pending => ControllerState::Pending,
            CanonicalStatus::Queued => ControllerState::Queued,
            CanonicalStatus::Processing => ControllerState::Processing,
            CanonicalStatus::Done => ControllerState::Done,
            CanonicalStatus::Error => ControllerState::Error,
            CanonicalStatus::Cancelled => ControllerState::Cancelled,
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a front end renders for the current job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub state: ControllerState,
    pub job_id: Option<JobId>,
    /// 0..=100; only `done` reaches 100.
    pub progress: u8,
    /// A `data:image/png;base64,...` URL or a remote URL.
    pub output_image: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: Timestamp,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            state: ControllerState::Idle,
            job_id: None,
            progress: 0,
            output_image: None,
            error_message: None,
            updated_at: Utc::now(),
        }
    }
}

impl JobSnapshot {
    /// Fresh state for a submission in flight.
    pub fn submitting() -> Self {
        Self {
            state: ControllerState::Submitting,
            ..Default::default()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Project onto the result record a front end displays.
    ///
    /// `None` while idle or before a job id is known.
    pub fn result(&self) -> Option<ProcessingResult> {
        let status = match self.state {
            ControllerState::Done => ResultStatus::Completed,
            ControllerState::Error | ControllerState::Cancelled => ResultStatus::Error,
            ControllerState::Idle => return None,
            _ => ResultStatus::Processing,
        };
        if self.job_id.is_none() && status != ResultStatus::Error {
            return None;
        }
        Some(ProcessingResult {
            run_id: self.job_id.clone().unwrap_or_default(),
            output_url: self.output_image.clone(),
            status,
            error: self.error_message.clone(),
        })
    }
}

/// Coarse outcome of a job as shown by result views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub run_id: String,
    pub output_url: Option<String>,
    pub status: ResultStatus,
    pub error: Option<String>,
}
