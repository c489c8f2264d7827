//! Lazily materialized child entities.

use super::{load, Entity};
use crate::error::CoreResult;
use crate::store::EntityStore;
use crate::types::EntityKey;

/// A child owned by a composite entity.
///
/// ```text
///   set()          store()                 release()
/// ──────▶ Transient ───────▶ Materialized ───────────▶ Unmaterialized
///                               ▲                           │
///                               └──────── ensure_loaded() ──┘
/// ```
///
/// A child without a live value always has a key. A `Transient` child has
/// never been stored and cannot be released: only a [`Resident`] guard,
/// which exists for `Materialized` slots alone, offers `release`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildSlot<T> {
    /// No child.
    Detached,
    /// Created in memory, never persisted.
    Transient(T),
    /// Loaded or stored. The key may lag behind unsaved edits.
    Materialized {
        /// Key of the last store or load.
        key: EntityKey,
        /// Live child.
        value: T,
    },
    /// Persisted and evicted from memory.
    Unmaterialized(EntityKey),
}

impl<T> Default for ChildSlot<T> {
    fn default() -> Self {
        Self::Detached
    }
}

impl<T: Entity> ChildSlot<T> {
    /// Slot referencing a persisted child that is not loaded yet.
    #[must_use]
    pub fn persisted(key: EntityKey) -> Self {
        Self::Unmaterialized(key)
    }

    /// Replaces the child with a new, unstored value.
    pub fn set(&mut self, value: T) {
        *self = Self::Transient(value);
    }

    /// Removes the child.
    pub fn detach(&mut self) {
        *self = Self::Detached;
    }

    /// Key of the persisted child, if any.
    #[must_use]
    pub fn key(&self) -> Option<EntityKey> {
        match self {
            Self::Materialized { key, .. } | Self::Unmaterialized(key) => Some(*key),
            Self::Detached | Self::Transient(_) => None,
        }
    }

    /// Returns true if a live value is held.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Materialized { .. })
    }

    /// The live child, without loading.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Transient(value) | Self::Materialized { value, .. } => Some(value),
            Self::Detached | Self::Unmaterialized(_) => None,
        }
    }

    /// The live child, mutably, without loading.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Transient(value) | Self::Materialized { value, .. } => Some(value),
            Self::Detached | Self::Unmaterialized(_) => None,
        }
    }

    /// Key to batch-fetch before [`ensure_loaded`](Self::ensure_loaded);
    /// only unmaterialized children need one.
    #[must_use]
    pub fn prefetch_requirement(&self) -> Option<EntityKey> {
        match self {
            Self::Unmaterialized(key) => Some(*key),
            _ => None,
        }
    }

    /// Loads an unmaterialized child and returns the live value.
    ///
    /// Returns `Ok(None)` for a detached slot.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound`, `SchemaMismatch` or a store error.
    pub fn ensure_loaded(&mut self, store: &EntityStore) -> CoreResult<Option<&mut T>> {
        if let Self::Unmaterialized(key) = *self {
            let value = load::<T>(store, key)?;
            *self = Self::Materialized { key, value };
        }
        Ok(self.get_mut())
    }

    /// Stores a live child under a fresh version and records its key.
    ///
    /// Live children are stored every time, edited or not. An
    /// unmaterialized child keeps its key; a detached slot yields `None`.
    ///
    /// # Errors
    ///
    /// Returns a store error; the slot is unchanged in that case.
    pub fn store(&mut self, store: &EntityStore) -> CoreResult<Option<EntityKey>> {
        let value = match self {
            Self::Detached => return Ok(None),
            Self::Unmaterialized(key) => return Ok(Some(*key)),
            Self::Transient(value) | Self::Materialized { value, .. } => value,
        };
        let key = value.store_new_version(store)?;
        *self = match std::mem::take(self) {
            Self::Transient(value) | Self::Materialized { value, .. } => {
                Self::Materialized { key, value }
            }
            other => other,
        };
        Ok(Some(key))
    }

    /// Guard over a materialized child; `None` for every other state.
    pub fn resident(&mut self) -> Option<Resident<'_, T>> {
        match *self {
            Self::Materialized { key, .. } => Some(Resident { slot: self, key }),
            _ => None,
        }
    }
}

/// A materialized child that may be released back to storage.
#[derive(Debug)]
pub struct Resident<'a, T> {
    slot: &'a mut ChildSlot<T>,
    key: EntityKey,
}

impl<T: Entity> Resident<'_, T> {
    /// Key of the last store or load.
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// Stores the child, then drops the live value and keeps its key.
    ///
    /// # Errors
    ///
    /// Returns a store error; the child stays resident in that case.
    pub fn release(self, store: &EntityStore) -> CoreResult<EntityKey> {
        let key = self.slot.store(store)?.unwrap_or(self.key);
        *self.slot = ChildSlot::Unmaterialized(key);
        Ok(key)
    }
}
