//! Shared domain types for the retouch client.
//!
//! Everything in this crate is pure: status normalization, the mask and
//! settings model, output image representation, and the payload builder
//! that merges user choices into the backend workflow template.

pub mod error;
pub mod options;
pub mod output;
pub mod payload;
pub mod status;
pub mod types;
