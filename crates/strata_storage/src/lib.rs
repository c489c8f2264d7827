//! # Strata Storage
//!
//! Document backend trait and implementations for Strata.
//!
//! This crate is the lowest layer: a collection-scoped document store
//! addressed by `(entity id, version)` keys. Backends are **opaque
//! document stores** - they never interpret document bodies.
//!
//! ## Design Principles
//!
//! - Batched requests: one call for many inserts, lookups or deletes
//! - Insert type is stored next to each document so callers can tell
//!   complete documents from out-of-line ones
//! - Identifier allocation lives with the store that owns the documents
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing, with request counters
//! - [`FileBackend`] - For a persistent repository directory
//!
//! ## Example
//!
//! ```rust
//! use strata_storage::{DocumentBackend, DocumentKey, InMemoryBackend, StoredDocument};
//!
//! let backend = InMemoryBackend::new();
//! let ids = backend.allocate_ids(2).unwrap();
//! let key = DocumentKey::new(ids[0], ids[1]);
//! backend.insert_many("demo", vec![StoredDocument::new(key, b"body".to_vec())]).unwrap();
//! let found = backend.find_one("demo", key).unwrap().unwrap();
//! assert_eq!(found.body, b"body");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{DocumentBackend, DocumentKey, InsertType, StoredDocument};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::{BackendStats, InMemoryBackend};
