//! Error types and Result aliases for dirfile.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using dirfile's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for host capability calls.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Main error type for dirfile operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The identity was not produced by this scheme's encoder.
    #[error("malformed identity '{identity}': {reason}")]
    MalformedIdentity { identity: String, reason: String },

    /// Failure reported by a host capability, passed through verbatim.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Watch registration error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures surfaced by the host filesystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("is a directory: {0}")]
    IsDirectory(String),
    #[error("not a directory: {0}")]
    NotDirectory(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(err.to_string()),
            ErrorKind::AlreadyExists => Self::AlreadyExists(err.to_string()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Watch registration errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to create the real watcher.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// A requested watch constraint cannot be expressed by the real watcher.
    #[error("unsupported watch option: {0}")]
    UnsupportedOption(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a malformed identity error.
    pub fn malformed(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedIdentity {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl HostError {
    /// Create a not-found error for a path.
    pub fn not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::NotFound(path.as_ref().display().to_string())
    }
}
