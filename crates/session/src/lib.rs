//! Job lifecycle for one image-processing request at a time.
//!
//! [`JobController`] submits a job through a
//! [`BackendAdapter`](retouch_backend::BackendAdapter), polls it on a fixed
//! interval, synthesizes a progress percentage while it runs, and exposes
//! the result through watch/broadcast channels.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod previews;
pub mod snapshot;
pub mod timers;

pub use config::ControllerConfig;
pub use controller::JobController;
pub use error::SessionError;
pub use events::JobEvent;
pub use snapshot::{ControllerState, JobSnapshot, ProcessingResult, ResultStatus};
