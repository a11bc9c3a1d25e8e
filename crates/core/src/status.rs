//! Normalization of backend status vocabularies.
//!
//! Every backend reports job state with its own strings. The controller
//! only ever sees [`CanonicalStatus`]; anything a mapper does not
//! recognize degrades to [`CanonicalStatus::Pending`] so that a backend
//! adding new states never breaks polling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The internal job status vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalStatus {
    #[default]
    Pending,
    Queued,
    Processing,
    Done,
    Error,
    Cancelled,
}

impl CanonicalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalStatus::Pending => "pending",
            CanonicalStatus::Queued => "queued",
            CanonicalStatus::Processing => "processing",
            CanonicalStatus::Done => "done",
            CanonicalStatus::Error => "error",
            CanonicalStatus::Cancelled => "cancelled",
        }
    }

    /// The job is still on the backend and should keep being polled.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CanonicalStatus::Pending | CanonicalStatus::Queued | CanonicalStatus::Processing
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a job-queue status string (`IN_QUEUE`, `IN_PROGRESS`, ...).
///
/// Matching is exact and case-sensitive.
pub fn map_status(raw: Option<&str>) -> CanonicalStatus {
    match raw {
        Some("IN_QUEUE") => CanonicalStatus::Queued,
        Some("IN_PROGRESS") => CanonicalStatus::Processing,
        Some("COMPLETED") => CanonicalStatus::Done,
        Some("FAILED") => CanonicalStatus::Error,
        Some("CANCELLED" | "CANCELED") => CanonicalStatus::Cancelled,
        _ => CanonicalStatus::Pending,
    }
}

/// Map a hosted-deployment run status (`queued`, `running`, `success`, ...).
pub fn map_deployment_status(raw: Option<&str>) -> CanonicalStatus {
    match raw {
        Some("not-started" | "queued") => CanonicalStatus::Queued,
        Some("started" | "running" | "uploading") => CanonicalStatus::Processing,
        Some("success") => CanonicalStatus::Done,
        Some("failed" | "error" | "timeout") => CanonicalStatus::Error,
        Some("cancelled" | "canceled") => CanonicalStatus::Cancelled,
        _ => CanonicalStatus::Pending,
    }
}
