//! Error types for video-info.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using video-info's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for video-info operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No info job is registered under this client UUID
    #[error("Info job with UUID {0} not found")]
    InfoNotFound(Uuid),

    /// An info job with this client UUID was already admitted
    #[error("An info job with UUID {0} already exists")]
    DuplicateUuid(Uuid),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the underlying database error is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::Database(sqlx::Error::Database(e)) if e.is_unique_violation())
    }

    /// Report a unique violation as an already admitted `uuid`.
    pub fn or_duplicate(self, uuid: Uuid) -> Self {
        if self.is_unique_violation() {
            Error::DuplicateUuid(uuid)
        } else {
            self
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
