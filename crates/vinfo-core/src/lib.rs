//! # vinfo-core
//!
//! Core types, traits, and abstractions for video-info.
//!
//! This crate provides the job queue records, job arguments, recorded
//! outcomes, the client status projection, and the error type that the
//! other video-info crates depend on.

pub mod defaults;
pub mod encoding;
pub mod error;
pub mod models;
pub mod status;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use status::project_info_job;
pub use traits::*;
