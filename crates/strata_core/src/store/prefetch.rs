//! Consume-once prefetch cache.

use crate::document::Document;
use crate::types::EntityId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Documents fetched ahead of use, keyed by entity id.
///
/// An entry is removed when it is read, so a prefetched document serves at
/// most one fetch. Entries are dropped when the active collection changes
/// or the entity is deleted.
#[derive(Debug, Default)]
pub struct PrefetchCache {
    entries: Mutex<HashMap<EntityId, Document>>,
}

impl PrefetchCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds documents, replacing older entries for the same entity.
    ///
    /// Returns the number of documents added.
    pub fn insert_batch(&self, documents: impl IntoIterator<Item = (EntityId, Document)>) -> usize {
        let mut entries = self.entries.lock();
        let mut added = 0;
        for (id, document) in documents {
            entries.insert(id, document);
            added += 1;
        }
        added
    }

    /// Removes and returns the entry for `id`.
    pub fn consume(&self, id: EntityId) -> Option<Document> {
        self.entries.lock().remove(&id)
    }

    /// Drops the entry for `id`. Returns true if one was waiting.
    pub fn invalidate(&self, id: EntityId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Drops the entries for all given ids.
    ///
    /// The id list is fully materialized before the map is touched.
    pub fn invalidate_many(&self, ids: impl IntoIterator<Item = EntityId>) -> usize {
        let ids: Vec<EntityId> = ids.into_iter().collect();
        let mut entries = self.entries.lock();
        ids.iter().filter(|id| entries.remove(id).is_some()).count()
    }

    /// Returns true if an entry for `id` is waiting.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of waiting entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityKey, Version};

    fn doc(id: u64) -> (EntityId, Document) {
        let key = EntityKey::new(EntityId(id), Version(id + 1));
        (key.id, Document::new("Sample", 1, key))
    }

    #[test]
    fn entries_are_consumed_once() {
        let cache = PrefetchCache::new();
        assert_eq!(cache.insert_batch([doc(10), doc(20)]), 2);

        assert!(cache.consume(EntityId(10)).is_some());
        assert!(cache.consume(EntityId(10)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_many_counts_removed() {
        let cache = PrefetchCache::new();
        cache.insert_batch([doc(10), doc(20), doc(30)]);

        let removed = cache.invalidate_many([EntityId(10), EntityId(30), EntityId(99)]);
        assert_eq!(removed, 2);
        assert!(cache.contains(EntityId(20)));
        assert!(!cache.contains(EntityId(10)));

        assert!(cache.invalidate(EntityId(20)));
        assert!(!cache.invalidate(EntityId(20)));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = PrefetchCache::new();
        cache.insert_batch([doc(10), doc(20)]);
        cache.clear();
        assert!(cache.is_empty());
    }
}
