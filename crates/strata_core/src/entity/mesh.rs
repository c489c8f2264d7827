use super::{AnyEntity, ChildSlot, Entity, EntityHeader, SchemaType};
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::hash::ContentHasher;
use crate::store::EntityStore;
use crate::types::{EntityId, EntityKey, Version};
use strata_codec::Value;

const FIELD_NODES: &str = "Nodes";
const FIELD_TRIANGLES: &str = "Triangles";
const FIELD_DATA_ID: &str = "MeshDataID";
const FIELD_DATA_VERSION: &str = "MeshDataVersion";

/// Triangulated geometry: node coordinates and node-index triangles.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    header: EntityHeader,
    nodes: Vec<[f64; 3]>,
    triangles: Vec<[u32; 3]>,
}

impl MeshData {
    /// Creates unstored geometry.
    pub fn new(name: impl Into<String>, nodes: Vec<[f64; 3]>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            header: EntityHeader::new(name),
            nodes,
            triangles,
        }
    }

    /// Node coordinates.
    #[must_use]
    pub fn nodes(&self) -> &[[f64; 3]] {
        &self.nodes
    }

    /// Triangles as node indices.
    #[must_use]
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Order-independent digest of the triangle geometry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArtifact`] if a triangle references a
    /// missing node.
    pub fn content_digest(&self) -> CoreResult<String> {
        let mut hasher = ContentHasher::new();
        for (index, triangle) in self.triangles.iter().enumerate() {
            let mut coordinates = Vec::with_capacity(9);
            for &node in triangle {
                let point = self.nodes.get(node as usize).ok_or_else(|| {
                    CoreError::invalid_artifact(index + 1, format!("node {node} out of range"))
                })?;
                coordinates.extend_from_slice(point);
            }
            hasher.add_element(&coordinates);
        }
        Ok(hasher.finish())
    }
}

impl Entity for MeshData {
    const SCHEMA: SchemaType = SchemaType::MeshData;

    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    fn write_fields(&self, document: &mut Document) {
        let nodes = self
            .nodes
            .iter()
            .flatten()
            .map(|&c| Value::Float(c))
            .collect();
        let triangles = self
            .triangles
            .iter()
            .flatten()
            .map(|&i| Value::Integer(i64::from(i)))
            .collect();
        document.set(FIELD_NODES, Value::Array(nodes));
        document.set(FIELD_TRIANGLES, Value::Array(triangles));
    }

    fn read_fields(header: EntityHeader, document: &Document) -> CoreResult<Self> {
        let coordinates = document
            .array(FIELD_NODES)?
            .iter()
            .map(|v| v.as_float().ok_or_else(|| CoreError::invalid_field(FIELD_NODES, "floats")))
            .collect::<CoreResult<Vec<f64>>>()?;
        let indices = document
            .array(FIELD_TRIANGLES)?
            .iter()
            .map(|v| {
                v.as_integer()
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| CoreError::invalid_field(FIELD_TRIANGLES, "node indices"))
            })
            .collect::<CoreResult<Vec<u32>>>()?;
        if coordinates.len() % 3 != 0 {
            return Err(CoreError::invalid_field(FIELD_NODES, "triples"));
        }
        if indices.len() % 3 != 0 {
            return Err(CoreError::invalid_field(FIELD_TRIANGLES, "triples"));
        }
        Ok(Self {
            header,
            nodes: coordinates.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
            triangles: indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        })
    }

    fn from_any(entity: AnyEntity) -> CoreResult<Self> {
        match entity {
            AnyEntity::MeshData(data) => Ok(data),
            other => Err(other.mismatch(Self::SCHEMA)),
        }
    }
}

/// A mesh whose geometry is a separately stored, lazily loaded child.
///
/// Storing the mesh stores a live geometry child first and records its key.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    header: EntityHeader,
    data: ChildSlot<MeshData>,
}

impl Mesh {
    /// Creates an unstored mesh without geometry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: EntityHeader::new(name),
            data: ChildSlot::Detached,
        }
    }

    /// Sets new, unstored geometry.
    #[must_use]
    pub fn with_data(mut self, data: MeshData) -> Self {
        self.data.set(data);
        self
    }

    /// The geometry slot.
    #[must_use]
    pub fn data_slot(&self) -> &ChildSlot<MeshData> {
        &self.data
    }

    /// The geometry slot, mutably.
    pub fn data_slot_mut(&mut self) -> &mut ChildSlot<MeshData> {
        &mut self.data
    }

    /// The geometry, loading it from `store` if it was released.
    ///
    /// # Errors
    ///
    /// Returns an error if the geometry cannot be loaded.
    pub fn mesh_data(&mut self, store: &EntityStore) -> CoreResult<Option<&mut MeshData>> {
        self.data.ensure_loaded(store)
    }

    /// Stores the geometry and drops it from memory.
    ///
    /// Returns `None` if there is no loaded geometry to release.
    ///
    /// # Errors
    ///
    /// Returns an error if the geometry cannot be stored.
    pub fn release_mesh_data(&mut self, store: &EntityStore) -> CoreResult<Option<EntityKey>> {
        if self.data.get().is_some() && self.data.key().is_none() {
            // A never-stored child gets a key before it can be released.
            self.data.store(store)?;
        }
        match self.data.resident() {
            Some(resident) => resident.release(store).map(Some),
            None => Ok(None),
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
fn as_field(raw: u64) -> i64 {
    raw as i64
}

impl Entity for Mesh {
    const SCHEMA: SchemaType = SchemaType::Mesh;

    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    fn write_fields(&self, document: &mut Document) {
        if let Some(key) = self.data.key() {
            document.set(FIELD_DATA_ID, as_field(key.id.0));
            document.set(FIELD_DATA_VERSION, as_field(key.version.0));
        }
    }

    fn read_fields(header: EntityHeader, document: &Document) -> CoreResult<Self> {
        let data = if document.get(FIELD_DATA_ID).is_some() {
            ChildSlot::persisted(EntityKey::new(
                EntityId(document.unsigned(FIELD_DATA_ID)?),
                Version(document.unsigned(FIELD_DATA_VERSION)?),
            ))
        } else {
            ChildSlot::Detached
        };
        Ok(Self { header, data })
    }

    fn from_any(entity: AnyEntity) -> CoreResult<Self> {
        match entity {
            AnyEntity::Mesh(mesh) => Ok(mesh),
            other => Err(other.mismatch(Self::SCHEMA)),
        }
    }

    fn store_children(&mut self, store: &EntityStore) -> CoreResult<()> {
        self.data.store(store)?;
        Ok(())
    }

    fn prefetch_requirements(&self) -> Vec<EntityKey> {
        self.data.prefetch_requirement().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::entity::load;
    use std::sync::Arc;
    use strata_storage::InMemoryBackend;

    fn store() -> (Arc<InMemoryBackend>, EntityStore) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = EntityStore::new(backend.clone(), StoreConfig::default());
        assert!(store.connect("memory://"));
        store.set_collection("meshes").unwrap();
        (backend, store)
    }

    fn square() -> MeshData {
        MeshData::new(
            "square",
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn storing_mesh_stores_geometry_first() {
        let (backend, store) = store();
        let mut mesh = Mesh::new("part").with_data(square());

        let key = mesh.store_new_version(&store).unwrap();
        assert_eq!(backend.document_count("meshes"), 2);

        let mut loaded: Mesh = load(&store, key).unwrap();
        assert!(!loaded.data_slot().is_loaded());
        assert_eq!(loaded.prefetch_requirements().len(), 1);

        let data = loaded.mesh_data(&store).unwrap().unwrap();
        assert_eq!(data.triangles(), square().triangles());
        assert!(loaded.prefetch_requirements().is_empty());
    }

    #[test]
    fn prefetched_geometry_needs_no_single_fetch() {
        let (backend, store) = store();
        let mut mesh = Mesh::new("part").with_data(square());
        let key = mesh.store_new_version(&store).unwrap();

        let mut loaded: Mesh = load(&store, key).unwrap();
        store.fetch_batch(&loaded.prefetch_requirements()).unwrap();
        let finds = backend.stats().single_finds;
        loaded.mesh_data(&store).unwrap().unwrap();
        assert_eq!(backend.stats().single_finds, finds);
    }

    #[test]
    fn release_transient_geometry_stores_it() {
        let (backend, store) = store();
        let mut mesh = Mesh::new("part").with_data(square());

        let key = mesh.release_mesh_data(&store).unwrap().unwrap();
        assert!(!mesh.data_slot().is_loaded());
        assert_eq!(mesh.data_slot().key(), Some(key));
        assert!(backend.document_count("meshes") >= 1);

        let data = mesh.mesh_data(&store).unwrap().unwrap();
        assert_eq!(data.nodes().len(), 4);
    }

    #[test]
    fn digest_ignores_triangle_order() {
        let a = square();
        let b = MeshData::new("square", a.nodes().to_vec(), vec![[0, 2, 3], [0, 1, 2]]);
        assert_eq!(a.content_digest().unwrap(), b.content_digest().unwrap());
    }

    #[test]
    fn digest_rejects_dangling_nodes() {
        let bad = MeshData::new("bad", vec![[0.0; 3]], vec![[0, 1, 2]]);
        assert!(matches!(
            bad.content_digest(),
            Err(CoreError::InvalidArtifact { line: 1, .. })
        ));
    }
}
