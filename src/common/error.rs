//! Error types for blobnode

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage root not enumerable: {0}")]
    Root(String),

    #[error("failed to prepare {}: {reason}", local.display())]
    Prepare { local: PathBuf, reason: String },

    #[error("tag read failed")]
    ReadFailed,

    // === Admission Errors ===
    #[error("request queue full")]
    QueueFull,

    // === Tag Errors ===
    #[error("tag not found: {0}")]
    NotFound(String),

    #[error("malformed object name: {0}")]
    BadObjectName(String),

    #[error("commit destinations do not name this node: {0}")]
    NoCommitTarget(String),

    // === Config Errors ===
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("node service unavailable")]
    Unavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this an error the caller should back off and retry?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueueFull)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Internal(e.to_string())
    }
}
