//! hostsnap common types, IDs, and errors.
//!
//! This crate provides foundational types shared across hs-core modules:
//! - Process identity wrapper
//! - Common error type for caller-facing failures
//! - Output format specification for the CLI

pub mod error;
pub mod id;
pub mod output;

pub use error::{Error, Result};
pub use id::ProcessId;
pub use output::OutputFormat;
