//! Error types for Strata core.

use crate::types::EntityKey;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] strata_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] strata_codec::CodecError),

    /// The store was used before `connect` succeeded.
    #[error("entity store is not connected")]
    NotConnected,

    /// The store was used before a collection was selected.
    #[error("no active collection")]
    NoCollection,

    /// Version 1 is reserved and can never be written or read.
    #[error("version 1 is reserved (entity {entity_id})")]
    ReservedVersion {
        /// Entity the write or read was aimed at.
        entity_id: u64,
    },

    /// A document without an entity id cannot be stored.
    #[error("entity id is not assigned")]
    UnassignedId,

    /// A mandatory document field is missing.
    #[error("missing field: {field}")]
    MissingField {
        /// Name of the field.
        field: String,
    },

    /// A document field has the wrong type or an out-of-range value.
    #[error("invalid field {field}: expected {expected}")]
    InvalidField {
        /// Name of the field.
        field: String,
        /// What the field should have held.
        expected: &'static str,
    },

    /// A `SchemaType` string that no entity kind claims.
    #[error("unknown schema type: {name}")]
    UnknownSchemaType {
        /// The unrecognised discriminator.
        name: String,
    },

    /// The document holds a different entity kind than requested.
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Requested kind.
        expected: String,
        /// Kind found in the document.
        found: String,
    },

    /// The document was written with another schema version.
    #[error("unsupported schema version {found} for {type_name} (expected {expected})")]
    UnsupportedSchemaVersion {
        /// Entity kind.
        type_name: String,
        /// Version this build reads.
        expected: i64,
        /// Version found in the document.
        found: i64,
    },

    /// A referenced entity does not exist in the active collection.
    #[error("entity not found: {key}")]
    EntityNotFound {
        /// The missing key.
        key: EntityKey,
    },

    /// A derived artifact could not be parsed for hashing.
    #[error("invalid artifact at line {line}: {message}")]
    InvalidArtifact {
        /// One-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidField {
            field: field.into(),
            expected,
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid artifact error.
    pub fn invalid_artifact(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            line,
            message: message.into(),
        }
    }

    /// Returns true for misuse of the store (used before `connect` or
    /// before a collection is selected). These are programming errors.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoreError::NotConnected | CoreError::NoCollection)
    }

    /// Returns true if the backend could not be reached.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_unreachable())
    }
}
