//! Identity and version types.

use std::fmt;
use strata_storage::DocumentKey;

/// Stable identifier shared by every version of one logical entity.
///
/// `EntityId(0)` means "not yet assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The unassigned id.
    pub const UNASSIGNED: Self = Self(0);

    /// Creates a new entity id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true once an id has been assigned.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// Identifier of one content snapshot of an entity.
///
/// `Version(1)` is a reserved sentinel for legacy/uninitialized data and is
/// rejected on every read and write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub u64);

impl Version {
    /// The reserved sentinel.
    pub const RESERVED: Self = Self(1);

    /// Creates a new version.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for the reserved sentinel.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::RESERVED.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Full address of an immutable entity snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    /// Entity id.
    pub id: EntityId,
    /// Snapshot version.
    pub version: Version,
}

impl EntityKey {
    /// Creates a new key.
    #[must_use]
    pub const fn new(id: EntityId, version: Version) -> Self {
        Self { id, version }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id.0, self.version.0)
    }
}

impl From<EntityKey> for DocumentKey {
    fn from(key: EntityKey) -> Self {
        DocumentKey::new(key.id.0, key.version.0)
    }
}

impl From<DocumentKey> for EntityKey {
    fn from(key: DocumentKey) -> Self {
        EntityKey::new(EntityId(key.entity_id), Version(key.version))
    }
}
