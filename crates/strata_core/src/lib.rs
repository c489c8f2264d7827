//! # Strata Core
//!
//! Versioned, content-addressed entity persistence.
//!
//! This crate provides:
//! - Entity ids, versions and keys (`Version(1)` is reserved)
//! - Named-field [`Document`]s with mandatory schema fields
//! - The [`EntityStore`] over any `DocumentBackend`, with a consume-once
//!   [`PrefetchCache`] and a batching [`WriteQueue`]
//! - Typed entities rebuilt by [`SchemaType`], and lazily loaded
//!   [`ChildSlot`] children
//! - [`ContentHasher`] for order-independent artifact digests
//!
//! Every `(id, version)` pair names an immutable snapshot: a new version is
//! written instead of overwriting an old one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod document;
pub mod entity;
mod error;
mod hash;
mod store;
mod types;

pub use config::{StoreConfig, DEFAULT_FLUSH_THRESHOLD, DEFAULT_MAX_INLINE_DOCUMENT};
pub use document::{
    schema_version_field, Document, FIELD_ENTITY_ID, FIELD_SCHEMA_TYPE, FIELD_VERSION,
    SCHEMA_VERSION_PREFIX,
};
pub use entity::{
    load, load_entity, AnyEntity, BinaryData, ChildSlot, Entity, EntityHeader, FileEntity, Mesh,
    MeshData, PathKind, Resident, SchemaType,
};
pub use error::{CoreError, CoreResult};
pub use hash::ContentHasher;
pub use store::{EntityStore, PrefetchCache, StoreAck, WriteQueue};
pub use types::{EntityId, EntityKey, Version};
