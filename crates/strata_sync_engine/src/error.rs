//! Error types for the sync engine.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Model service refused the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Entity store error.
    #[error("store error: {0}")]
    Store(#[from] strata_core::CoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] strata_codec::CodecError),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The project file path has no extension.
    #[error("the file path is invalid: {}", path.display())]
    InvalidPath {
        /// Offending path.
        path: PathBuf,
    },

    /// The project file does not exist.
    #[error("project file not found: {}", path.display())]
    ProjectMissing {
        /// Offending path.
        path: PathBuf,
    },

    /// The project file exists but has no cache folder.
    #[error("project is not connected to version control: {}", path.display())]
    NotUnderVersionControl {
        /// Project file.
        path: PathBuf,
    },

    /// Import over an existing cache folder.
    #[error("cache folder already exists: {}", path.display())]
    CacheAlreadyExists {
        /// Cache folder.
        path: PathBuf,
    },

    /// Cache folder and project disagree.
    #[error("cache consistency error: {message}")]
    CacheConsistency {
        /// Description.
        message: String,
    },

    /// Filesystem operation failed.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Version manifest could not be read or written.
    #[error("invalid version manifest {}: {source}", path.display())]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Download of a version failed.
    #[error("project could not be restored to version {version}: {source}")]
    RestoreFailed {
        /// Requested version.
        version: String,
        /// Underlying error.
        #[source]
        source: Box<SyncError>,
    },

    /// A background worker failed before returning a result.
    #[error("sync worker failed: {0}")]
    Worker(String),

    /// An operation is already in flight.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a filesystem error for `path`.
    pub fn filesystem(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a cache consistency error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::CacheConsistency {
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ServerError(_) => true,
            SyncError::Store(e) => e.is_unreachable(),
            _ => false,
        }
    }

    /// Returns true if the error describes something the user can fix
    /// locally (paths, cache folders) rather than a service failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidPath { .. }
                | SyncError::ProjectMissing { .. }
                | SyncError::NotUnderVersionControl { .. }
                | SyncError::CacheAlreadyExists { .. }
                | SyncError::CacheConsistency { .. }
                | SyncError::Filesystem { .. }
        )
    }

    /// Returns true for network failures: an unreachable backend or
    /// service, or an explicit failure response.
    pub fn is_network(&self) -> bool {
        match self {
            SyncError::Transport { .. } | SyncError::ServerError(_) | SyncError::NotConnected => {
                true
            }
            SyncError::Store(e) => e.is_unreachable(),
            SyncError::RestoreFailed { source, .. } => source.is_network(),
            _ => false,
        }
    }
}
