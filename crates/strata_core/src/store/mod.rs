//! Versioned entity persistence over a document backend.

mod prefetch;
mod queue;

pub use prefetch::PrefetchCache;
pub use queue::WriteQueue;

use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::types::{EntityId, EntityKey, Version};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use strata_storage::{DocumentBackend, DocumentKey, InsertType, StoredDocument};
use tracing::{debug, warn};

/// Outcome of [`EntityStore::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreAck {
    /// Key the document was written under.
    pub key: EntityKey,
    /// How the document was tagged.
    pub insert_type: InsertType,
    /// True if the write is waiting in the queue.
    pub queued: bool,
}

/// Stores and retrieves immutable `(id, version)` document snapshots in the
/// active collection of a backend.
///
/// The store must be connected and have an active collection before any
/// read or write. Reads check the consume-once [`PrefetchCache`] first.
/// Writes go straight to the backend unless queue writing is enabled.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use strata_core::{Document, EntityId, EntityKey, EntityStore, StoreConfig, Version};
/// use strata_storage::InMemoryBackend;
///
/// let store = EntityStore::new(Arc::new(InMemoryBackend::new()), StoreConfig::default());
/// assert!(store.connect("memory://"));
/// store.set_collection("demo").unwrap();
///
/// let key = EntityKey::new(EntityId(10), Version(11));
/// store.store(&Document::new("Note", 1, key)).unwrap();
/// assert!(store.fetch_one(key).unwrap().is_some());
/// ```
pub struct EntityStore {
    backend: Arc<dyn DocumentBackend>,
    config: StoreConfig,
    server: RwLock<Option<String>>,
    collection: RwLock<Option<String>>,
    prefetch: PrefetchCache,
    queue: Mutex<WriteQueue>,
}

impl EntityStore {
    /// Creates an unconnected store over `backend`.
    pub fn new(backend: Arc<dyn DocumentBackend>, config: StoreConfig) -> Self {
        let queue = WriteQueue::new(config.flush_threshold);
        Self {
            backend,
            config,
            server: RwLock::new(None),
            collection: RwLock::new(None),
            prefetch: PrefetchCache::new(),
            queue: Mutex::new(queue),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the backend.
    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    /// Connects to the server at `url`.
    ///
    /// Idempotent: once connected, later calls return true without another
    /// round trip. An unreachable server is logged and reported as false.
    pub fn connect(&self, url: &str) -> bool {
        if let Some(current) = self.server.read().as_deref() {
            if current != url {
                debug!(current, requested = url, "already connected, keeping current server");
            }
            return true;
        }

        let mut server = self.server.write();
        if server.is_some() {
            return true;
        }
        match self.backend.ping() {
            Ok(()) => {
                debug!(url, "connected to document server");
                *server = Some(url.to_string());
                true
            }
            Err(e) => {
                warn!(url, error = %e, "could not connect to document server");
                false
            }
        }
    }

    /// Returns true once [`connect`](Self::connect) has succeeded.
    pub fn is_connected(&self) -> bool {
        self.server.read().is_some()
    }

    /// Returns the server url passed to a successful connect.
    pub fn server_url(&self) -> Option<String> {
        self.server.read().clone()
    }

    /// Makes `name` the active collection, creating it if missing.
    ///
    /// Selecting another collection drops every prefetched document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotConnected`] before a successful connect, or
    /// a storage error if the collection cannot be created.
    pub fn set_collection(&self, name: &str) -> CoreResult<()> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }
        let mut collection = self.collection.write();
        if collection.as_deref() == Some(name) {
            return Ok(());
        }
        self.backend.ensure_collection(name)?;
        self.prefetch.clear();
        debug!(collection = name, "active collection changed");
        *collection = Some(name.to_string());
        Ok(())
    }

    /// Returns the active collection.
    pub fn collection(&self) -> Option<String> {
        self.collection.read().clone()
    }

    fn active_collection(&self) -> CoreResult<String> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }
        self.collection.read().clone().ok_or(CoreError::NoCollection)
    }

    /// Returns the prefetch cache.
    pub fn prefetch_cache(&self) -> &PrefetchCache {
        &self.prefetch
    }

    /// Allocates `count` fresh values from the backend's id counter.
    ///
    /// The counter is shared by entity ids and versions.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotConnected`] or a storage error.
    pub fn allocate_ids(&self, count: usize) -> CoreResult<Vec<u64>> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }
        Ok(self.backend.allocate_ids(count)?)
    }

    /// Allocates a fresh version for `id`, and a fresh id first if `id`
    /// is unassigned.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn next_key(&self, id: EntityId) -> CoreResult<EntityKey> {
        if id.is_assigned() {
            let ids = self.allocate_ids(1)?;
            let version = ids.first().copied().ok_or_else(short_allocation)?;
            Ok(EntityKey::new(id, Version(version)))
        } else {
            let ids = self.allocate_ids(2)?;
            match ids.as_slice() {
                [id, version] => Ok(EntityKey::new(EntityId(*id), Version(*version))),
                _ => Err(short_allocation()),
            }
        }
    }

    /// Persists a document under its own `(EntityID, Version)`.
    ///
    /// With queue writing enabled the document is buffered; the batch is
    /// flushed automatically once it reaches the configured threshold.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotConnected`] / [`CoreError::NoCollection`]
    /// - [`CoreError::UnassignedId`] if the document has id `0`
    /// - [`CoreError::ReservedVersion`] for version `1`
    /// - storage or codec errors
    pub fn store(&self, document: &Document) -> CoreResult<StoreAck> {
        let collection = self.active_collection()?;
        let key = document.key()?;
        if key.version.is_reserved() {
            return Err(CoreError::ReservedVersion {
                entity_id: key.id.0,
            });
        }
        if !key.id.is_assigned() {
            return Err(CoreError::UnassignedId);
        }
        document.validate()?;

        let body = document.encode()?;
        let insert_type = if body.len() >= self.config.max_inline_document_size {
            InsertType::FileStorage
        } else {
            InsertType::Database
        };
        let stored = StoredDocument::new(key.into(), body).with_insert_type(insert_type);

        let mut queue = self.queue.lock();
        if queue.is_enabled() {
            if queue.push(stored) {
                debug!(pending = queue.len(), "write queue reached threshold");
                self.flush_locked(&mut queue)?;
            }
            return Ok(StoreAck {
                key,
                insert_type,
                queued: !queue.is_empty(),
            });
        }
        drop(queue);

        self.backend.insert_many(&collection, vec![stored])?;
        Ok(StoreAck {
            key,
            insert_type,
            queued: false,
        })
    }

    /// Fetches one snapshot by exact key.
    ///
    /// A prefetched document for the same id is consumed first; it is only
    /// returned if its version matches, otherwise the backend is asked.
    /// Writes still waiting in the queue are not visible.
    ///
    /// # Errors
    ///
    /// Returns a configuration, storage or decoding error. A missing
    /// document is `Ok(None)`.
    pub fn fetch_one(&self, key: EntityKey) -> CoreResult<Option<Document>> {
        let collection = self.active_collection()?;
        if key.version.is_reserved() {
            return Err(CoreError::ReservedVersion {
                entity_id: key.id.0,
            });
        }

        if let Some(document) = self.prefetch.consume(key.id) {
            if document.version()? == key.version {
                return Ok(Some(document));
            }
            debug!(%key, "discarding prefetched document with other version");
        }

        match self.backend.find_one(&collection, key.into())? {
            Some(stored) => Ok(Some(Document::decode(&stored.body)?)),
            None => Ok(None),
        }
    }

    /// Fetches many snapshots in one request and parks them in the
    /// prefetch cache.
    ///
    /// Documents not stored complete (`InsertType::FileStorage`) are
    /// skipped; a later [`fetch_one`](Self::fetch_one) reads them directly.
    /// Returns the number of documents cached.
    ///
    /// # Errors
    ///
    /// Returns a configuration, storage or decoding error.
    pub fn fetch_batch(&self, keys: &[EntityKey]) -> CoreResult<usize> {
        let collection = self.active_collection()?;
        if keys.is_empty() {
            return Ok(0);
        }
        let doc_keys: Vec<DocumentKey> = keys.iter().map(|&k| k.into()).collect();
        let found = self.backend.find_any(&collection, &doc_keys)?;

        let mut documents = Vec::with_capacity(found.len());
        for stored in found {
            if !stored.insert_type.is_complete() {
                continue;
            }
            let document = Document::decode(&stored.body)?;
            documents.push((EntityId(stored.key.entity_id), document));
        }
        let cached = self.prefetch.insert_batch(documents);
        debug!(requested = keys.len(), cached, "prefetched documents");
        Ok(cached)
    }

    /// Deletes snapshots by exact key.
    ///
    /// Prefetched entries for the affected ids are dropped first. No keys
    /// is a no-op, one key is a single-document delete, more keys are a
    /// single batch request. Returns the number of documents removed.
    ///
    /// # Errors
    ///
    /// Returns a configuration or storage error.
    pub fn delete_many(&self, keys: &[EntityKey]) -> CoreResult<u64> {
        let collection = self.active_collection()?;

        let removed = match keys {
            [] => 0,
            [key] => {
                self.prefetch.invalidate(key.id);
                self.backend.delete_one(&collection, (*key).into())?
            }
            _ => {
                self.prefetch.invalidate_many(keys.iter().map(|k| k.id));
                let doc_keys: Vec<DocumentKey> = keys.iter().map(|&k| k.into()).collect();
                self.backend.delete_any(&collection, &doc_keys)?
            }
        };
        debug!(requested = keys.len(), removed, "deleted documents");
        Ok(removed)
    }

    /// Turns queue writing on or off. Turning it off flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if the implied flush fails.
    pub fn set_queue_writing(&self, enabled: bool) -> CoreResult<()> {
        let mut queue = self.queue.lock();
        if queue.set_enabled(enabled) {
            self.flush_locked(&mut queue)?;
        }
        Ok(())
    }

    /// Returns true while writes are queued.
    pub fn is_queue_writing(&self) -> bool {
        self.queue.lock().is_enabled()
    }

    /// Number of documents waiting in the write queue.
    pub fn pending_writes(&self) -> usize {
        self.queue.lock().len()
    }

    /// Sends all queued documents to the active collection as one batch.
    ///
    /// Returns the number of documents written.
    ///
    /// # Errors
    ///
    /// Returns a configuration or storage error. A failed batch is dropped.
    pub fn flush(&self) -> CoreResult<usize> {
        let mut queue = self.queue.lock();
        self.flush_locked(&mut queue)
    }

    fn flush_locked(&self, queue: &mut WriteQueue) -> CoreResult<usize> {
        if queue.is_empty() {
            return Ok(0);
        }
        // The collection is resolved at flush time, not when queued.
        let collection = self.active_collection()?;
        let batch = queue.take();
        let count = batch.len();
        self.backend.insert_many(&collection, batch)?;
        debug!(collection, count, "flushed write queue");
        Ok(count)
    }
}

fn short_allocation() -> CoreError {
    CoreError::invalid_operation("backend returned fewer ids than requested")
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("server", &*self.server.read())
            .field("collection", &*self.collection.read())
            .field("prefetched", &self.prefetch.len())
            .field("pending_writes", &self.queue.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::InMemoryBackend;

    fn setup() -> (Arc<InMemoryBackend>, EntityStore) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = EntityStore::new(backend.clone(), StoreConfig::default());
        assert!(store.connect("memory://test"));
        store.set_collection("project").unwrap();
        (backend, store)
    }

    fn doc(id: u64, version: u64) -> Document {
        Document::new("Sample", 1, EntityKey::new(EntityId(id), Version(version)))
            .with("Payload", vec![id as u8; 8])
    }

    #[test]
    fn unconnected_store_rejects_use() {
        let store = EntityStore::new(Arc::new(InMemoryBackend::new()), StoreConfig::default());
        assert!(matches!(store.set_collection("x"), Err(CoreError::NotConnected)));
        let err = store.store(&doc(10, 20)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_collection_is_configuration_error() {
        let store = EntityStore::new(Arc::new(InMemoryBackend::new()), StoreConfig::default());
        assert!(store.connect("memory://"));
        assert!(matches!(store.store(&doc(10, 20)), Err(CoreError::NoCollection)));
    }

    #[test]
    fn connect_is_idempotent() {
        let (backend, store) = setup();
        let before = backend.stats().requests;
        assert!(store.connect("memory://test"));
        assert!(store.connect("memory://other"));
        assert_eq!(backend.stats().requests, before);
    }

    #[test]
    fn failed_connect_returns_false() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_online(false);
        let store = EntityStore::new(backend, StoreConfig::default());
        assert!(!store.connect("memory://down"));
        assert!(!store.is_connected());
    }

    #[test]
    fn store_then_fetch_is_identical() {
        let (_, store) = setup();
        let original = doc(10, 20);
        let ack = store.store(&original).unwrap();
        assert!(!ack.queued);
        assert_eq!(ack.insert_type, InsertType::Database);

        let fetched = store
            .fetch_one(EntityKey::new(EntityId(10), Version(20)))
            .unwrap()
            .unwrap();
        assert_eq!(fetched, original);
        assert_eq!(fetched.encode().unwrap(), original.encode().unwrap());
    }

    #[test]
    fn reserved_version_is_rejected() {
        let (_, store) = setup();
        let err = store
            .fetch_one(EntityKey::new(EntityId(10), Version::RESERVED))
            .unwrap_err();
        assert!(matches!(err, CoreError::ReservedVersion { entity_id: 10 }));
    }

    #[test]
    fn unassigned_id_is_rejected() {
        let (_, store) = setup();
        assert!(matches!(store.store(&doc(0, 20)), Err(CoreError::UnassignedId)));
    }

    #[test]
    fn fetch_missing_is_none() {
        let (_, store) = setup();
        assert!(store
            .fetch_one(EntityKey::new(EntityId(77), Version(78)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn prefetch_serves_each_document_once() {
        let (backend, store) = setup();
        let keys: Vec<EntityKey> = (0..3)
            .map(|i| EntityKey::new(EntityId(10 + i), Version(20 + i)))
            .collect();
        for key in &keys {
            store.store(&doc(key.id.0, key.version.0)).unwrap();
        }

        assert_eq!(store.fetch_batch(&keys).unwrap(), 3);
        let finds_before = backend.stats().single_finds;
        for key in &keys {
            assert!(store.fetch_one(*key).unwrap().is_some());
        }
        assert_eq!(backend.stats().single_finds, finds_before);
        assert!(store.prefetch_cache().is_empty());

        store.fetch_one(keys[0]).unwrap();
        assert_eq!(backend.stats().single_finds, finds_before + 1);
    }

    #[test]
    fn prefetch_with_other_version_falls_through() {
        let (backend, store) = setup();
        store.store(&doc(10, 20)).unwrap();
        store.store(&doc(10, 21)).unwrap();

        store
            .fetch_batch(&[EntityKey::new(EntityId(10), Version(20))])
            .unwrap();
        let fetched = store
            .fetch_one(EntityKey::new(EntityId(10), Version(21)))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.version().unwrap(), Version(21));
        assert_eq!(backend.stats().single_finds, 1);
        assert!(store.prefetch_cache().is_empty());
    }

    #[test]
    fn large_documents_are_not_prefetched() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = EntityStore::new(
            backend,
            StoreConfig::new().max_inline_document_size(64),
        );
        assert!(store.connect("memory://"));
        store.set_collection("project").unwrap();

        let big = doc(10, 20).with("Blob", vec![7u8; 128]);
        let ack = store.store(&big).unwrap();
        assert_eq!(ack.insert_type, InsertType::FileStorage);

        let key = EntityKey::new(EntityId(10), Version(20));
        assert_eq!(store.fetch_batch(&[key]).unwrap(), 0);
        assert_eq!(store.fetch_one(key).unwrap().unwrap(), big);
    }

    #[test]
    fn changing_collection_clears_prefetch() {
        let (_, store) = setup();
        store.store(&doc(10, 20)).unwrap();
        store
            .fetch_batch(&[EntityKey::new(EntityId(10), Version(20))])
            .unwrap();
        assert_eq!(store.prefetch_cache().len(), 1);

        store.set_collection("project").unwrap();
        assert_eq!(store.prefetch_cache().len(), 1);
        store.set_collection("other").unwrap();
        assert!(store.prefetch_cache().is_empty());
    }

    #[test]
    fn delete_many_dispatch() {
        let (backend, store) = setup();
        for i in 0..3 {
            store.store(&doc(10 + i, 20 + i)).unwrap();
        }

        assert_eq!(store.delete_many(&[]).unwrap(), 0);
        assert_eq!(backend.stats().single_deletes, 0);
        assert_eq!(backend.stats().batch_deletes, 0);

        let one = [EntityKey::new(EntityId(10), Version(20))];
        assert_eq!(store.delete_many(&one).unwrap(), 1);
        assert_eq!(backend.stats().single_deletes, 1);

        let two = [
            EntityKey::new(EntityId(11), Version(21)),
            EntityKey::new(EntityId(12), Version(22)),
        ];
        assert_eq!(store.delete_many(&two).unwrap(), 2);
        assert_eq!(backend.stats().batch_deletes, 1);
        assert_eq!(backend.document_count("project"), 0);
    }

    #[test]
    fn delete_invalidates_prefetch() {
        let (_, store) = setup();
        let key = EntityKey::new(EntityId(10), Version(20));
        store.store(&doc(10, 20)).unwrap();
        store.fetch_batch(&[key]).unwrap();

        store.delete_many(&[key]).unwrap();
        assert!(store.prefetch_cache().is_empty());
        assert!(store.fetch_one(key).unwrap().is_none());
    }

    #[test]
    fn queued_writes_flush_as_one_batch() {
        let (backend, store) = setup();
        store.set_queue_writing(true).unwrap();
        for i in 0..5 {
            let ack = store.store(&doc(10 + i, 20 + i)).unwrap();
            assert!(ack.queued);
        }
        assert_eq!(backend.document_count("project"), 0);
        assert_eq!(store.pending_writes(), 5);

        let batches = backend.stats().insert_batches;
        store.set_queue_writing(false).unwrap();
        assert_eq!(backend.stats().insert_batches, batches + 1);
        assert_eq!(backend.document_count("project"), 5);
        assert_eq!(store.pending_writes(), 0);
    }

    #[test]
    fn queue_flushes_at_threshold() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = EntityStore::new(backend.clone(), StoreConfig::new().flush_threshold(1));
        assert!(store.connect("memory://"));
        store.set_collection("project").unwrap();
        store.set_queue_writing(true).unwrap();

        let ack = store.store(&doc(10, 20)).unwrap();
        assert!(!ack.queued);
        assert!(store.is_queue_writing());
        assert_eq!(backend.document_count("project"), 1);
    }

    #[test]
    fn queued_duplicate_key_keeps_last() {
        let (backend, store) = setup();
        store.set_queue_writing(true).unwrap();
        store.store(&doc(10, 20).with("Tag", "first")).unwrap();
        store.store(&doc(10, 20).with("Tag", "second")).unwrap();
        store.flush().unwrap();

        assert_eq!(backend.document_count("project"), 1);
        let fetched = store
            .fetch_one(EntityKey::new(EntityId(10), Version(20)))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.text("Tag").unwrap(), "second");
    }

    #[test]
    fn flush_uses_collection_active_at_flush_time() {
        let (backend, store) = setup();
        store.set_queue_writing(true).unwrap();
        store.store(&doc(10, 20)).unwrap();
        store.set_collection("later").unwrap();
        store.flush().unwrap();

        assert_eq!(backend.document_count("project"), 0);
        assert_eq!(backend.document_count("later"), 1);
    }

    #[test]
    fn next_key_assigns_missing_ids() {
        let (_, store) = setup();
        let fresh = store.next_key(EntityId::UNASSIGNED).unwrap();
        assert!(fresh.id.is_assigned());
        assert_ne!(fresh.id.0, fresh.version.0);

        let again = store.next_key(fresh.id).unwrap();
        assert_eq!(again.id, fresh.id);
        assert!(again.version > fresh.version);
        assert!(!again.version.is_reserved());
    }
}
