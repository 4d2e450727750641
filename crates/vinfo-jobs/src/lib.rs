//! # vinfo-jobs
//!
//! Background processing for video-info.
//!
//! This crate provides:
//! - The job handler contract and a concurrent worker over the `job_queue` table
//! - Video probing through `ffprobe`
//! - The info handler (probe, record the outcome, fan out the webhook job)
//! - The webhook handler (at-least-once delivery with retry)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vinfo_db::Database;
//! use vinfo_jobs::{FfprobeProbe, InfoHandler, WebhookHandler, WorkerBuilder, WorkerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//!
//! let worker = WorkerBuilder::new(db.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(InfoHandler::new(db, Arc::new(FfprobeProbe::from_env())))
//!     .with_handler(WebhookHandler::from_env()?)
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod info_handler;
pub mod probe;
pub mod webhook_handler;
pub mod worker;

// Re-export core types
pub use vinfo_core::*;

pub use handler::{JobContext, JobHandler, JobResult};
pub use info_handler::InfoHandler;
pub use probe::{parse_probe_output, FfprobeProbe, MediaProbe, ProbeError};
pub use webhook_handler::WebhookHandler;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
