//! Centralized default constants for video-info.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and binaries reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8080;

/// Maximum accepted request body size for admission requests.
pub const REQUEST_BODY_LIMIT_BYTES: usize = 64 * 1024;

// =============================================================================
// DATABASE
// =============================================================================

/// Default Postgres port when `VI_DB_PORT` is not a full URL component.
pub const DB_PORT: u16 = 5432;

/// Default maximum number of pooled connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Attempts before a repeatedly failing job is discarded.
pub const JOB_MAX_ATTEMPTS: i32 = 25;

/// Upper bound on the retry delay between attempts.
pub const JOB_BACKOFF_MAX_SECS: u64 = 3600;

/// Idle poll interval for the worker loop.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Jobs claimed per worker batch.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// A job running longer than this is considered abandoned by a crashed worker.
pub const JOB_RESCUE_AFTER_SECS: u64 = 3600;

/// How often the worker looks for abandoned jobs.
pub const JOB_RESCUE_INTERVAL_SECS: u64 = 60;

/// Capacity of the worker event broadcast channel.
pub const JOB_EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// PROBE
// =============================================================================

/// Default media probe executable.
pub const FFPROBE_BINARY: &str = "ffprobe";

// =============================================================================
// WEBHOOK
// =============================================================================

/// Per-attempt webhook delivery timeout.
pub const WEBHOOK_TIMEOUT_SECS: u64 = 30;
