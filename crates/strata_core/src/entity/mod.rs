//! Typed entities and their document schema.
//!
//! Every entity kind maps to a [`SchemaType`] and reads/writes its own
//! fields on top of a common [`EntityHeader`]. The string form of the
//! schema type only appears at the document boundary; everything else
//! dispatches on the enum.

mod binary;
mod file;
mod mesh;
mod slot;

pub use binary::BinaryData;
pub use file::{FileEntity, PathKind};
pub use mesh::{Mesh, MeshData};
pub use slot::{ChildSlot, Resident};

use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::store::{EntityStore, StoreAck};
use crate::types::{EntityId, EntityKey, Version};
use std::fmt;
use std::str::FromStr;

const FIELD_NAME: &str = "Name";
const FIELD_OWNER: &str = "Owner";
const FIELD_EDITABLE: &str = "Editable";

/// Closed set of entity kinds that can be rebuilt from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    /// Opaque payload bytes.
    BinaryData,
    /// File metadata referencing a [`SchemaType::BinaryData`] entity.
    File,
    /// Composite mesh with a lazily loaded geometry child.
    Mesh,
    /// Mesh geometry.
    MeshData,
}

impl SchemaType {
    /// Every kind.
    pub const ALL: [SchemaType; 4] = [
        SchemaType::BinaryData,
        SchemaType::File,
        SchemaType::Mesh,
        SchemaType::MeshData,
    ];

    /// Discriminator stored in the `SchemaType` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SchemaType::BinaryData => "BinaryData",
            SchemaType::File => "File",
            SchemaType::Mesh => "Mesh",
            SchemaType::MeshData => "MeshData",
        }
    }

    /// Schema version this build writes and accepts.
    #[must_use]
    pub const fn schema_version(self) -> i64 {
        match self {
            SchemaType::BinaryData | SchemaType::File | SchemaType::MeshData => 1,
            SchemaType::Mesh => 2,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownSchemaType { name: s.to_string() })
    }
}

/// Fields shared by every entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHeader {
    /// Entity id, [`EntityId::UNASSIGNED`] until first stored.
    pub id: EntityId,
    /// Version of the last store or load.
    pub version: Version,
    /// Display or logical name.
    pub name: String,
    /// Owning component.
    pub owner: String,
    /// Whether users may edit the entity.
    pub editable: bool,
}

impl EntityHeader {
    /// Creates a header for a new, unstored entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            version: Version::default(),
            name: name.into(),
            owner: String::new(),
            editable: true,
        }
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Sets the editable flag.
    #[must_use]
    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    /// Current key.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.id, self.version)
    }

    fn write(&self, document: &mut Document) {
        document.set(FIELD_NAME, self.name.as_str());
        document.set(FIELD_OWNER, self.owner.as_str());
        document.set(FIELD_EDITABLE, self.editable);
    }

    fn read(document: &Document) -> CoreResult<Self> {
        Ok(Self {
            id: document.entity_id()?,
            version: document.version()?,
            name: document.text(FIELD_NAME)?.to_string(),
            owner: document.text(FIELD_OWNER)?.to_string(),
            editable: document.boolean(FIELD_EDITABLE)?,
        })
    }
}

/// A typed entity persisted as one document per version.
pub trait Entity: Sized {
    /// Kind written into the document.
    const SCHEMA: SchemaType;

    /// Common fields.
    fn header(&self) -> &EntityHeader;

    /// Common fields, mutably.
    fn header_mut(&mut self) -> &mut EntityHeader;

    /// Writes the kind-specific fields.
    fn write_fields(&self, document: &mut Document);

    /// Rebuilds the entity from its header and kind-specific fields.
    fn read_fields(header: EntityHeader, document: &Document) -> CoreResult<Self>;

    /// Unwraps the matching [`AnyEntity`] variant.
    fn from_any(entity: AnyEntity) -> CoreResult<Self>;

    /// Persists owned children so their keys can be recorded.
    fn store_children(&mut self, _store: &EntityStore) -> CoreResult<()> {
        Ok(())
    }

    /// Keys of children that still have to be fetched.
    fn prefetch_requirements(&self) -> Vec<EntityKey> {
        Vec::new()
    }

    /// Current key.
    fn key(&self) -> EntityKey {
        self.header().key()
    }

    /// Builds the document for the current key.
    fn to_document(&self) -> Document {
        let schema = Self::SCHEMA;
        let mut document = Document::new(schema.as_str(), schema.schema_version(), self.key());
        self.header().write(&mut document);
        self.write_fields(&mut document);
        document
    }

    /// Rebuilds the entity, checking kind and schema version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaMismatch`],
    /// [`CoreError::UnsupportedSchemaVersion`] or a field error.
    fn from_document(document: &Document) -> CoreResult<Self> {
        let schema = Self::SCHEMA;
        let found = document.schema_type()?;
        if found != schema.as_str() {
            return Err(CoreError::SchemaMismatch {
                expected: schema.as_str().to_string(),
                found: found.to_string(),
            });
        }
        let version = document.schema_version(found)?;
        if version != schema.schema_version() {
            return Err(CoreError::UnsupportedSchemaVersion {
                type_name: found.to_string(),
                expected: schema.schema_version(),
                found: version,
            });
        }
        Self::read_fields(EntityHeader::read(document)?, document)
    }

    /// Stores children, then this entity under `version` with its current id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnassignedId`] if no id was assigned, or a store
    /// error.
    fn store_as(&mut self, store: &EntityStore, version: Version) -> CoreResult<StoreAck> {
        if !self.header().id.is_assigned() {
            return Err(CoreError::UnassignedId);
        }
        self.store_children(store)?;
        self.header_mut().version = version;
        store.store(&self.to_document())
    }

    /// Stores under a freshly allocated version, assigning an id first if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an allocation or store error.
    fn store_new_version(&mut self, store: &EntityStore) -> CoreResult<EntityKey> {
        let key = store.next_key(self.header().id)?;
        self.header_mut().id = key.id;
        self.store_as(store, key.version)?;
        Ok(key)
    }
}

/// Any entity kind, rebuilt from a document by its `SchemaType`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyEntity {
    /// See [`BinaryData`].
    BinaryData(BinaryData),
    /// See [`FileEntity`].
    File(FileEntity),
    /// See [`Mesh`].
    Mesh(Mesh),
    /// See [`MeshData`].
    MeshData(MeshData),
}

impl AnyEntity {
    /// Rebuilds the concrete entity named by the document's `SchemaType`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSchemaType`] or a decoding error.
    pub fn from_document(document: &Document) -> CoreResult<Self> {
        Ok(match document.schema_type()?.parse::<SchemaType>()? {
            SchemaType::BinaryData => Self::BinaryData(BinaryData::from_document(document)?),
            SchemaType::File => Self::File(FileEntity::from_document(document)?),
            SchemaType::Mesh => Self::Mesh(Mesh::from_document(document)?),
            SchemaType::MeshData => Self::MeshData(MeshData::from_document(document)?),
        })
    }

    /// Kind of the wrapped entity.
    #[must_use]
    pub fn schema_type(&self) -> SchemaType {
        match self {
            Self::BinaryData(_) => SchemaType::BinaryData,
            Self::File(_) => SchemaType::File,
            Self::Mesh(_) => SchemaType::Mesh,
            Self::MeshData(_) => SchemaType::MeshData,
        }
    }

    /// Header of the wrapped entity.
    #[must_use]
    pub fn header(&self) -> &EntityHeader {
        match self {
            Self::BinaryData(e) => e.header(),
            Self::File(e) => e.header(),
            Self::Mesh(e) => e.header(),
            Self::MeshData(e) => e.header(),
        }
    }

    /// Error for a request that expected `expected` but found this entity.
    #[must_use]
    pub fn mismatch(&self, expected: SchemaType) -> CoreError {
        CoreError::SchemaMismatch {
            expected: expected.to_string(),
            found: self.schema_type().to_string(),
        }
    }
}

/// Fetches `key` and rebuilds whatever entity kind it holds.
///
/// # Errors
///
/// Returns [`CoreError::EntityNotFound`] if no document exists, or a
/// decoding error.
pub fn load_entity(store: &EntityStore, key: EntityKey) -> CoreResult<AnyEntity> {
    let document = store
        .fetch_one(key)?
        .ok_or(CoreError::EntityNotFound { key })?;
    AnyEntity::from_document(&document)
}

/// Fetches `key` as a specific entity kind.
///
/// # Errors
///
/// Returns [`CoreError::SchemaMismatch`] if the document holds another
/// kind, or any error of [`load_entity`].
pub fn load<T: Entity>(store: &EntityStore, key: EntityKey) -> CoreResult<T> {
    T::from_any(load_entity(store, key)?)
}
