//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use strata_codec::Value;
use strata_core::{Document, EntityId, EntityKey, MeshData, Version};

/// Strategy for assigned entity ids (never `0`).
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    (2u64..1_000_000).prop_map(EntityId)
}

/// Strategy for stored versions (never `0` or the reserved `1`).
pub fn version_strategy() -> impl Strategy<Value = Version> {
    (2u64..1_000_000).prop_map(Version)
}

/// Strategy for entity keys of stored snapshots.
pub fn entity_key_strategy() -> impl Strategy<Value = EntityKey> {
    (entity_id_strategy(), version_strategy()).prop_map(|(id, version)| EntityKey::new(id, version))
}

/// Strategy for valid collection and project names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}")
        .expect("Invalid regex")
        .prop_filter("Collection name must not be empty", |s| !s.is_empty())
}

/// Strategy for file payloads (arbitrary bytes).
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for scalar field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,24}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ]
}

/// Strategy for valid documents of schema type `Generic`.
///
/// Extra field names start with a lowercase letter so they never clash
/// with the mandatory fields.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    (
        entity_key_strategy(),
        1i64..8,
        prop::collection::btree_map(
            prop::string::string_regex("[a-z][a-zA-Z0-9]{0,15}").expect("Invalid regex"),
            field_value_strategy(),
            0..8,
        ),
    )
        .prop_map(|(key, schema_version, fields)| {
            let mut document = Document::new("Generic", schema_version, key);
            for (name, value) in fields {
                document.set(name, value);
            }
            document
        })
}

/// Strategy for triangulated geometry with in-range node indices.
pub fn mesh_data_strategy() -> impl Strategy<Value = MeshData> {
    prop::collection::vec(
        prop::array::uniform3(-1.0e6f64..1.0e6),
        3..32,
    )
    .prop_flat_map(|nodes| {
        let count = nodes.len() as u32;
        let triangles =
            prop::collection::vec(prop::array::uniform3(0..count), 1..16);
        (Just(nodes), triangles)
    })
    .prop_map(|(nodes, triangles)| MeshData::new("mesh", nodes, triangles))
}

/// Strategy for relative result file paths such as `sub/file3.txt`.
pub fn result_path_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(
            prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex"),
            0..3,
        ),
        prop::string::string_regex("[a-z][a-z0-9]{0,7}\\.(txt|bin|csv)").expect("Invalid regex"),
    )
        .prop_map(|(dirs, file)| {
            let mut parts = dirs;
            parts.push(file);
            parts.join("/")
        })
}

/// Strategy for a set of result files with distinct paths.
///
/// A path is never also used as a directory by another path.
pub fn result_tree_strategy(max_files: usize) -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::btree_map(result_path_strategy(), payload_strategy(), 1..max_files.max(2))
        .prop_map(|files| {
            let paths: Vec<String> = files.keys().cloned().collect();
            files
                .into_iter()
                .filter(|(path, _)| {
                    let prefix = format!("{path}/");
                    !paths.iter().any(|other| other.starts_with(&prefix))
                })
                .collect()
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for tests touching the filesystem.
    #[must_use]
    pub fn filesystem() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 50,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
