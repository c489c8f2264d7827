//! Codec errors.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Reasons a value cannot be encoded or a byte string cannot be decoded.
///
/// Decoding errors carry the offset of the item that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ends in the middle of an item.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Offset of the truncated read.
        offset: usize,
    },

    /// Well-formed CBOR that has a shorter or differently ordered encoding.
    #[error("non-canonical item at offset {offset}: {reason}")]
    NonCanonical {
        /// Offset of the item.
        offset: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// CBOR that documents never contain.
    #[error("unsupported item at offset {offset}: {what}")]
    Unsupported {
        /// Offset of the item.
        offset: usize,
        /// The construct found.
        what: &'static str,
    },

    /// NaN has no canonical encoding.
    #[error("NaN cannot be encoded")]
    NaN,

    /// A map holds the same key twice.
    #[error("duplicate map key")]
    DuplicateKey,

    /// Text string is not UTF-8.
    #[error("invalid UTF-8 in text string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string.
        offset: usize,
    },

    /// Integer outside the `i64` range.
    #[error("integer at offset {offset} does not fit in i64")]
    IntegerOverflow {
        /// Offset of the integer.
        offset: usize,
    },

    /// A length prefix announces more than the input holds.
    #[error("length {claimed} at offset {offset} exceeds the {available} remaining bytes")]
    LengthExceeded {
        /// Offset of the item.
        offset: usize,
        /// Announced length.
        claimed: u64,
        /// Bytes left after the head.
        available: usize,
    },

    /// Arrays and maps nested deeper than the decoder allows.
    #[error("nesting deeper than {limit} levels")]
    TooDeep {
        /// Nesting limit.
        limit: usize,
    },

    /// Bytes left after the top-level item.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },

    /// Decoded value does not have the expected shape.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the mismatch.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Offset into the input where decoding failed, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            CodecError::UnexpectedEof { offset }
            | CodecError::NonCanonical { offset, .. }
            | CodecError::Unsupported { offset, .. }
            | CodecError::InvalidUtf8 { offset }
            | CodecError::IntegerOverflow { offset }
            | CodecError::LengthExceeded { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}
