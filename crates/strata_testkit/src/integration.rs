//! Cross-crate integration test helpers.
//!
//! Provides utilities for testing interactions between the entity store,
//! the document backends and the sync engine's on-disk trees.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::{Document, EntityKey, EntityStore};
use walkdir::WalkDir;

/// Collection used by [`StoreHarness`].
pub const HARNESS_COLLECTION: &str = "harness";

/// A test harness that stores documents and remembers what it wrote.
pub struct StoreHarness {
    /// The store under test.
    pub store: Arc<EntityStore>,
    documents: HashMap<EntityKey, Document>,
}

impl StoreHarness {
    /// Connects `store` and selects the harness collection.
    pub fn new(store: Arc<EntityStore>) -> Self {
        assert!(store.connect("harness://"), "Failed to connect store");
        store
            .set_collection(HARNESS_COLLECTION)
            .expect("Failed to select collection");
        Self {
            store,
            documents: HashMap::new(),
        }
    }

    /// Stores a document and tracks it for later verification.
    pub fn store(&mut self, document: Document) {
        let key = document.key().expect("Document without key");
        self.store.store(&document).expect("Failed to store document");
        self.documents.insert(key, document);
    }

    /// Fetches a document and verifies it matches the tracked value.
    pub fn fetch_and_verify(&self, key: EntityKey) -> Option<Document> {
        let actual = self.store.fetch_one(key).expect("Failed to fetch document");
        if let Some(expected) = self.documents.get(&key) {
            assert_eq!(actual.as_ref(), Some(expected), "Document mismatch for {key}");
        }
        actual
    }

    /// Deletes documents and updates tracking.
    pub fn delete(&mut self, keys: &[EntityKey]) {
        self.store.delete_many(keys).expect("Failed to delete documents");
        for key in keys {
            self.documents.remove(key);
        }
    }

    /// Verifies all tracked documents are in the store.
    pub fn verify_all(&self) {
        self.store.flush().expect("Failed to flush");
        for (key, expected) in &self.documents {
            let actual = self.store.fetch_one(*key).expect("Failed to fetch document");
            assert_eq!(actual.as_ref(), Some(expected), "Document mismatch for {key}");
        }
    }

    /// Returns the count of tracked documents.
    pub fn tracked_count(&self) -> usize {
        self.documents.len()
    }
}

/// Helpers for comparing directory trees.
pub mod trees {
    use super::*;

    /// Every file under `dir` by `/`-separated relative path, with its bytes.
    pub fn read_tree(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .map(|entry| entry.expect("Failed to walk directory"))
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let relative = entry
                    .path()
                    .strip_prefix(dir)
                    .expect("Walked path outside root")
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                let bytes = fs::read(entry.path()).expect("Failed to read file");
                (relative, bytes)
            })
            .collect()
    }

    /// Like [`read_tree`] but skips everything under `exclude`.
    pub fn read_tree_excluding(dir: &Path, exclude: &Path) -> BTreeMap<String, Vec<u8>> {
        let skipped = exclude
            .strip_prefix(dir)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let nested = format!("{skipped}/");
        read_tree(dir)
            .into_iter()
            .filter(|(path, _)| skipped.is_empty() || !path.starts_with(&nested))
            .collect()
    }

    /// Asserts that the working tree of a project equals a cached snapshot.
    pub fn assert_snapshot_matches(project_dir: &Path, cache_dir: &Path, version: &str) {
        let working = read_tree_excluding(project_dir, cache_dir);
        let snapshot = read_tree(&cache_dir.join(version));
        assert_eq!(working, snapshot, "working tree differs from version {version}");
    }

    /// Paths of the files in `tree`.
    pub fn paths(tree: &BTreeMap<String, Vec<u8>>) -> Vec<PathBuf> {
        tree.keys().map(PathBuf::from).collect()
    }
}
