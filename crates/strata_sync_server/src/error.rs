//! Error types for the model service.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the model service.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format or content.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request for a project that was never committed.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// Request for a version that does not exist.
    #[error("unknown version {version} of project {project}")]
    UnknownVersion {
        /// Project name.
        project: String,
        /// Requested version label.
        version: String,
    },

    /// No handler for the request path.
    #[error("no route for {0}")]
    NoRoute(String),

    /// Document backend error.
    #[error("storage error: {0}")]
    Storage(#[from] strata_storage::StorageError),

    /// Message encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] strata_codec::CodecError),

    /// Version registry could not be (de)serialized.
    #[error("registry error: {0}")]
    Registry(#[from] serde_json::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnknownProject(_)
                | ServerError::UnknownVersion { .. }
                | ServerError::NoRoute(_)
                | ServerError::Codec(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::UnknownProject("foo".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::UnknownVersion {
            project: "foo".into(),
            version: "9".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("foo"));
        assert!(msg.contains('9'));
    }
}
