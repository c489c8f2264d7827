//! Document backend trait definition.

use crate::error::StorageResult;
use std::fmt;

/// Address of one stored document: the entity id plus the content version.
///
/// Both halves are opaque to the backend. Id `0` and version `1` are
/// reserved by the entity layer and never reach a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey {
    /// Entity id (stable across versions).
    pub entity_id: u64,
    /// Content version.
    pub version: u64,
}

impl DocumentKey {
    /// Creates a new key.
    #[must_use]
    pub const fn new(entity_id: u64, version: u64) -> Self {
        Self { entity_id, version }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity_id, self.version)
    }
}

/// How a document was written.
///
/// Only [`InsertType::Database`] documents are complete in the document
/// store. Large payloads are tagged [`InsertType::FileStorage`]; callers that
/// batch-prefetch must skip them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertType {
    /// The whole document lives in the document store.
    Database,
    /// The document was too large for inline storage.
    FileStorage,
}

impl InsertType {
    /// Returns true if the stored document is complete.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, InsertType::Database)
    }

    /// Single-byte tag used by on-disk backends.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            InsertType::Database => 0,
            InsertType::FileStorage => 1,
        }
    }

    /// Parses an on-disk tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(InsertType::Database),
            1 => Some(InsertType::FileStorage),
            _ => None,
        }
    }
}

/// A document as the backend sees it: a key, an insert type and an opaque
/// encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Document address.
    pub key: DocumentKey,
    /// How the document was written.
    pub insert_type: InsertType,
    /// Canonical encoded body.
    pub body: Vec<u8>,
}

impl StoredDocument {
    /// Creates a document with [`InsertType::Database`].
    #[must_use]
    pub fn new(key: DocumentKey, body: Vec<u8>) -> Self {
        Self {
            key,
            insert_type: InsertType::Database,
            body,
        }
    }

    /// Sets the insert type.
    #[must_use]
    pub fn with_insert_type(mut self, insert_type: InsertType) -> Self {
        self.insert_type = insert_type;
        self
    }
}

/// A remote (or local) document store addressed by collection and key.
///
/// Backends are **opaque document stores**: they never interpret the body
/// of a document. The entity layer owns the encoding.
///
/// # Invariants
///
/// - `insert_many` replaces any document already stored under the same key
/// - `find_one` returns exactly the bytes last inserted under that key
/// - `find_any` and `delete_any` are single requests, however many keys
/// - `allocate_ids` never returns `0` or `1` and never repeats a value
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For a persistent repository directory
pub trait DocumentBackend: Send + Sync {
    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Unreachable`] if it is not.
    fn ping(&self) -> StorageResult<()>;

    /// Creates the collection (and its key index) if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection name is invalid or an I/O error
    /// occurs.
    fn ensure_collection(&self, collection: &str) -> StorageResult<()>;

    /// Inserts a batch of documents in one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the batch.
    fn insert_many(&self, collection: &str, documents: Vec<StoredDocument>) -> StorageResult<()>;

    /// Looks up one document by exact key.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails. A missing document is
    /// `Ok(None)`.
    fn find_one(&self, collection: &str, key: DocumentKey)
        -> StorageResult<Option<StoredDocument>>;

    /// Looks up every document matching any of the keys, in one request.
    ///
    /// Missing keys are silently absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn find_any(&self, collection: &str, keys: &[DocumentKey])
        -> StorageResult<Vec<StoredDocument>>;

    /// Deletes one document by exact key. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_one(&self, collection: &str, key: DocumentKey) -> StorageResult<u64>;

    /// Deletes every document matching any of the keys, in one request.
    /// Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_any(&self, collection: &str, keys: &[DocumentKey]) -> StorageResult<u64>;

    /// Allocates `count` fresh identifiers.
    ///
    /// Identifiers serve both as entity ids and as versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the id counter cannot be advanced.
    fn allocate_ids(&self, count: usize) -> StorageResult<Vec<u64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_type_tags() {
        for insert_type in [InsertType::Database, InsertType::FileStorage] {
            assert_eq!(InsertType::from_tag(insert_type.tag()), Some(insert_type));
        }
        assert_eq!(InsertType::from_tag(9), None);
        assert!(InsertType::Database.is_complete());
        assert!(!InsertType::FileStorage.is_complete());
    }

    #[test]
    fn key_display() {
        assert_eq!(DocumentKey::new(42, 7).to_string(), "42@7");
    }
}
