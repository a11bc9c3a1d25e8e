//! Lifecycle events published by the controller on a broadcast channel.

use serde::{Deserialize, Serialize};

use crate::snapshot::ControllerState;

/// Default buffer capacity for the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A state transition of the controller's current job.
///
/// Subscribers that fall behind observe `RecvError::Lagged`; the watch
/// channel always holds the latest full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// The backend accepted a job.
    Submitted { job_id: String, state: ControllerState },

    /// A poll moved the job to a different non-terminal state.
    StatusChanged { job_id: String, state: ControllerState },

    /// Displayed progress changed.
    Progress { job_id: String, progress: u8 },

    Completed {
        job_id: String,
        output_image: Option<String>,
    },

    /// Submit, a poll, or the backend itself reported a failure.
    Failed {
        job_id: Option<String>,
        message: String,
    },

    Cancelled { job_id: Option<String> },

    /// The controller returned to idle.
    Reset,
}

impl JobEvent {
    /// Job the event refers to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobEvent::Submitted { job_id, .. }
            | JobEvent::StatusChanged { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. } => Some(job_id),
            JobEvent::Failed { job_id, .. } | JobEvent::Cancelled { job_id } => job_id.as_deref(),
            JobEvent::Reset => None,
        }
    }
}
