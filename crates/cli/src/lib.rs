//! Building blocks of the `retouch` command: argument parsing, input
//! encoding and output saving.

pub mod args;
pub mod input;
pub mod output;
