// src/error.rs

//! Error types for the package feed

use thiserror::Error;

/// Errors raised by the feed core
#[derive(Error, Debug)]
pub enum Error {
    /// Push targets an id+version that already exists and overwrite is disabled
    #[error("package {id} {version} already exists")]
    DuplicatePackage { id: String, version: String },

    /// Archive could not be parsed, or was rejected by policy
    #[error("invalid package: {0}")]
    InvalidPackage(String),

    /// Mutation targeted a package that is not in the feed
    #[error("package {id} {version} not found")]
    PackageNotFound { id: String, version: String },

    /// Version string could not be parsed
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Target framework name could not be parsed
    #[error("invalid target framework: {0}")]
    InvalidFramework(String),

    /// Request arguments were malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking task panicked or was aborted
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
