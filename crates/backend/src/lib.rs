//! HTTP clients for the image-processing backends.
//!
//! Every backend integration implements [`BackendAdapter`]: submit a job,
//! fetch its status, cancel it. Three variants exist:
//!
//! - [`job_queue`] -- `/run`, `/status/{id}`, `/cancel/{id}` job queue API.
//! - [`comfyui`] -- a ComfyUI server driven through its workflow-graph API.
//! - [`deployment`] -- a hosted deployment runner with a flat input map.
//!
//! Use [`connect`] to build the adapter selected by [`BackendConfig`].

pub mod adapter;
pub mod comfyui;
pub mod config;
pub mod deployment;
pub mod error;
pub mod extract;
pub mod http;
pub mod job_queue;

pub use adapter::{connect, BackendAdapter, StatusReport, SubmitReceipt, SubmitRequest};
pub use config::{BackendConfig, BackendKind, ConfigError};
pub use error::BackendError;
