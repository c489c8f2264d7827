//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend cannot be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// A stored document is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The collection name cannot be used by this backend.
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    /// The repository directory is held by another process.
    #[error("repository locked: another process has exclusive access")]
    Locked,
}

impl StorageError {
    /// Returns true if the error is a connectivity problem rather than a
    /// data problem.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StorageError::Unreachable(_))
    }
}
