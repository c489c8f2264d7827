//! In-memory document backend for testing.

use crate::backend::{DocumentBackend, DocumentKey, StoredDocument};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Request counters of an [`InMemoryBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Every call made through [`DocumentBackend`].
    pub requests: u64,
    /// Calls to `insert_many`.
    pub insert_batches: u64,
    /// Documents received through `insert_many`.
    pub documents_inserted: u64,
    /// Calls to `find_one`.
    pub single_finds: u64,
    /// Calls to `find_any`.
    pub batch_finds: u64,
    /// Calls to `delete_one`.
    pub single_deletes: u64,
    /// Calls to `delete_any`.
    pub batch_deletes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    insert_batches: AtomicU64,
    documents_inserted: AtomicU64,
    single_finds: AtomicU64,
    batch_finds: AtomicU64,
    single_deletes: AtomicU64,
    batch_deletes: AtomicU64,
}

type Collection = BTreeMap<DocumentKey, StoredDocument>;

/// An in-memory document backend.
///
/// This backend keeps every collection in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral repositories that don't need persistence
///
/// It counts every request so tests can assert how many round trips an
/// operation made, and it can be switched offline to simulate an
/// unreachable server.
///
/// # Example
///
/// ```rust
/// use strata_storage::{DocumentBackend, DocumentKey, InMemoryBackend, StoredDocument};
///
/// let backend = InMemoryBackend::new();
/// let key = DocumentKey::new(2, 3);
/// backend.insert_many("project", vec![StoredDocument::new(key, vec![0xa0])]).unwrap();
/// assert!(backend.find_one("project", key).unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, Collection>>,
    next_id: AtomicU64,
    online: AtomicBool,
    counters: Counters,
}

impl InMemoryBackend {
    /// Creates a new empty backend. The first allocated id is `2`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(2),
            online: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// Switches the backend on or offline.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns a snapshot of the request counters.
    #[must_use]
    pub fn stats(&self) -> BackendStats {
        let c = &self.counters;
        BackendStats {
            requests: c.requests.load(Ordering::SeqCst),
            insert_batches: c.insert_batches.load(Ordering::SeqCst),
            documents_inserted: c.documents_inserted.load(Ordering::SeqCst),
            single_finds: c.single_finds.load(Ordering::SeqCst),
            batch_finds: c.batch_finds.load(Ordering::SeqCst),
            single_deletes: c.single_deletes.load(Ordering::SeqCst),
            batch_deletes: c.batch_deletes.load(Ordering::SeqCst),
        }
    }

    /// Number of documents stored in a collection.
    #[must_use]
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns true if the collection has been created.
    #[must_use]
    pub fn has_collection(&self, collection: &str) -> bool {
        self.collections.read().contains_key(collection)
    }

    fn request(&self) -> StorageResult<()> {
        self.counters.requests.fetch_add(1, Ordering::SeqCst);
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unreachable("in-memory backend is offline".into()))
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBackend for InMemoryBackend {
    fn ping(&self) -> StorageResult<()> {
        self.request()
    }

    fn ensure_collection(&self, collection: &str) -> StorageResult<()> {
        self.request()?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    fn insert_many(&self, collection: &str, documents: Vec<StoredDocument>) -> StorageResult<()> {
        self.request()?;
        self.counters.insert_batches.fetch_add(1, Ordering::SeqCst);
        self.counters
            .documents_inserted
            .fetch_add(documents.len() as u64, Ordering::SeqCst);

        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_string()).or_default();
        for document in documents {
            target.insert(document.key, document);
        }
        Ok(())
    }

    fn find_one(
        &self,
        collection: &str,
        key: DocumentKey,
    ) -> StorageResult<Option<StoredDocument>> {
        self.request()?;
        self.counters.single_finds.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(&key))
            .cloned())
    }

    fn find_any(
        &self,
        collection: &str,
        keys: &[DocumentKey],
    ) -> StorageResult<Vec<StoredDocument>> {
        self.request()?;
        self.counters.batch_finds.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read();
        let Some(c) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(keys.iter().filter_map(|key| c.get(key).cloned()).collect())
    }

    fn delete_one(&self, collection: &str, key: DocumentKey) -> StorageResult<u64> {
        self.request()?;
        self.counters.single_deletes.fetch_add(1, Ordering::SeqCst);
        let removed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|c| c.remove(&key));
        Ok(u64::from(removed.is_some()))
    }

    fn delete_any(&self, collection: &str, keys: &[DocumentKey]) -> StorageResult<u64> {
        self.request()?;
        self.counters.batch_deletes.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write();
        let Some(c) = collections.get_mut(collection) else {
            return Ok(0);
        };
        Ok(keys.iter().filter(|key| c.remove(*key).is_some()).count() as u64)
    }

    fn allocate_ids(&self, count: usize) -> StorageResult<Vec<u64>> {
        self.request()?;
        let first = self.next_id.fetch_add(count as u64, Ordering::SeqCst);
        Ok((first..first + count as u64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: u64, version: u64, body: &[u8]) -> StoredDocument {
        StoredDocument::new(DocumentKey::new(id, version), body.to_vec())
    }

    #[test]
    fn insert_and_find() {
        let backend = InMemoryBackend::new();
        backend
            .insert_many("c", vec![doc(2, 3, b"a"), doc(2, 4, b"b")])
            .unwrap();

        let found = backend.find_one("c", DocumentKey::new(2, 4)).unwrap().unwrap();
        assert_eq!(found.body, b"b");
        assert!(backend.find_one("c", DocumentKey::new(2, 5)).unwrap().is_none());
        assert!(backend.find_one("other", DocumentKey::new(2, 3)).unwrap().is_none());
    }

    #[test]
    fn insert_overwrites_same_key() {
        let backend = InMemoryBackend::new();
        backend.insert_many("c", vec![doc(2, 3, b"old")]).unwrap();
        backend.insert_many("c", vec![doc(2, 3, b"new")]).unwrap();

        assert_eq!(backend.document_count("c"), 1);
        let found = backend.find_one("c", DocumentKey::new(2, 3)).unwrap().unwrap();
        assert_eq!(found.body, b"new");
    }

    #[test]
    fn find_any_skips_missing() {
        let backend = InMemoryBackend::new();
        backend
            .insert_many("c", vec![doc(2, 3, b"a"), doc(5, 6, b"b")])
            .unwrap();

        let keys = [
            DocumentKey::new(2, 3),
            DocumentKey::new(9, 9),
            DocumentKey::new(5, 6),
        ];
        assert_eq!(backend.find_any("c", &keys).unwrap().len(), 2);
        assert_eq!(backend.stats().batch_finds, 1);
    }

    #[test]
    fn delete_paths_are_counted() {
        let backend = InMemoryBackend::new();
        backend
            .insert_many("c", vec![doc(2, 3, b"a"), doc(4, 5, b"b"), doc(6, 7, b"c")])
            .unwrap();

        assert_eq!(backend.delete_one("c", DocumentKey::new(2, 3)).unwrap(), 1);
        let removed = backend
            .delete_any("c", &[DocumentKey::new(4, 5), DocumentKey::new(6, 7)])
            .unwrap();
        assert_eq!(removed, 2);

        let stats = backend.stats();
        assert_eq!(stats.single_deletes, 1);
        assert_eq!(stats.batch_deletes, 1);
        assert_eq!(backend.document_count("c"), 0);
    }

    #[test]
    fn allocated_ids_skip_reserved_values() {
        let backend = InMemoryBackend::new();
        let first = backend.allocate_ids(3).unwrap();
        let second = backend.allocate_ids(2).unwrap();

        assert_eq!(first, vec![2, 3, 4]);
        assert_eq!(second, vec![5, 6]);
    }

    #[test]
    fn offline_backend_rejects_requests() {
        let backend = InMemoryBackend::new();
        backend.set_online(false);

        assert!(backend.ping().unwrap_err().is_unreachable());
        assert!(backend.find_one("c", DocumentKey::new(2, 3)).is_err());

        backend.set_online(true);
        assert!(backend.ping().is_ok());
        assert_eq!(backend.stats().requests, 3);
    }
}
