//! Generic stored documents.
//!
//! A [`Document`] is a named-field map. Four fields are mandatory and
//! checked whenever a document is decoded:
//!
//! | Field                     | Type    |
//! |---------------------------|---------|
//! | `EntityID`                | integer |
//! | `Version`                 | integer, never `1` |
//! | `SchemaType`              | text    |
//! | `SchemaVersion_<SchemaType>` | integer |

use crate::error::{CoreError, CoreResult};
use crate::types::{EntityId, EntityKey, Version};
use std::collections::BTreeMap;
use strata_codec::{from_cbor, to_canonical_cbor, Value};

/// Field holding the entity id.
pub const FIELD_ENTITY_ID: &str = "EntityID";
/// Field holding the version.
pub const FIELD_VERSION: &str = "Version";
/// Field holding the polymorphic type discriminator.
pub const FIELD_SCHEMA_TYPE: &str = "SchemaType";
/// Prefix of the per-type schema version field.
pub const SCHEMA_VERSION_PREFIX: &str = "SchemaVersion_";

/// Name of the schema version field for a type.
#[must_use]
pub fn schema_version_field(type_name: &str) -> String {
    format!("{SCHEMA_VERSION_PREFIX}{type_name}")
}

/// A named-field document as stored by the entity store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

#[allow(clippy::cast_possible_wrap)]
fn id_value(raw: u64) -> Value {
    Value::Integer(raw as i64)
}

impl Document {
    /// Creates a document carrying all mandatory fields.
    #[must_use]
    pub fn new(schema_type: &str, schema_version: i64, key: EntityKey) -> Self {
        let mut doc = Self::default();
        doc.set(FIELD_SCHEMA_TYPE, schema_type);
        doc.set(schema_version_field(schema_type), schema_version);
        doc.set(FIELD_ENTITY_ID, id_value(key.id.0));
        doc.set(FIELD_VERSION, id_value(key.version.0));
        doc
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Sets a field and returns the document.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Removes a field.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Iterates over all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn require(&self, name: &str) -> CoreResult<&Value> {
        self.get(name).ok_or_else(|| CoreError::missing_field(name))
    }

    /// Reads an integer field.
    pub fn integer(&self, name: &str) -> CoreResult<i64> {
        self.require(name)?
            .as_integer()
            .ok_or_else(|| CoreError::invalid_field(name, "integer"))
    }

    /// Reads a non-negative integer field.
    pub fn unsigned(&self, name: &str) -> CoreResult<u64> {
        u64::try_from(self.integer(name)?)
            .map_err(|_| CoreError::invalid_field(name, "non-negative integer"))
    }

    /// Reads a float field (integers are widened).
    pub fn float(&self, name: &str) -> CoreResult<f64> {
        self.require(name)?
            .as_float()
            .ok_or_else(|| CoreError::invalid_field(name, "float"))
    }

    /// Reads a text field.
    pub fn text(&self, name: &str) -> CoreResult<&str> {
        self.require(name)?
            .as_text()
            .ok_or_else(|| CoreError::invalid_field(name, "text"))
    }

    /// Reads a boolean field.
    pub fn boolean(&self, name: &str) -> CoreResult<bool> {
        self.require(name)?
            .as_bool()
            .ok_or_else(|| CoreError::invalid_field(name, "boolean"))
    }

    /// Reads a binary field.
    pub fn bytes(&self, name: &str) -> CoreResult<&[u8]> {
        self.require(name)?
            .as_bytes()
            .ok_or_else(|| CoreError::invalid_field(name, "bytes"))
    }

    /// Reads an array field.
    pub fn array(&self, name: &str) -> CoreResult<&[Value]> {
        self.require(name)?
            .as_array()
            .ok_or_else(|| CoreError::invalid_field(name, "array"))
    }

    /// The entity id.
    pub fn entity_id(&self) -> CoreResult<EntityId> {
        self.unsigned(FIELD_ENTITY_ID).map(EntityId)
    }

    /// The version.
    pub fn version(&self) -> CoreResult<Version> {
        self.unsigned(FIELD_VERSION).map(Version)
    }

    /// The entity key.
    pub fn key(&self) -> CoreResult<EntityKey> {
        Ok(EntityKey::new(self.entity_id()?, self.version()?))
    }

    /// The polymorphic type discriminator.
    pub fn schema_type(&self) -> CoreResult<&str> {
        self.text(FIELD_SCHEMA_TYPE)
    }

    /// The schema version recorded for `type_name`.
    pub fn schema_version(&self, type_name: &str) -> CoreResult<i64> {
        self.integer(&schema_version_field(type_name))
    }

    /// Overwrites the entity id and version fields.
    pub fn set_key(&mut self, key: EntityKey) {
        self.set(FIELD_ENTITY_ID, id_value(key.id.0));
        self.set(FIELD_VERSION, id_value(key.version.0));
    }

    /// Converts to a CBOR map.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::map(
            self.fields
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
                .collect(),
        )
    }

    /// Builds a document from a CBOR map and checks the mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a text-keyed map or a mandatory
    /// field is missing or malformed.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        let Value::Map(pairs) = value else {
            return Err(CoreError::invalid_field("<document>", "map"));
        };
        let mut fields = BTreeMap::new();
        for (key, value) in pairs {
            let Value::Text(name) = key else {
                return Err(CoreError::invalid_field("<document>", "text field names"));
            };
            fields.insert(name, value);
        }
        let doc = Self { fields };
        doc.validate()?;
        Ok(doc)
    }

    /// Checks that all mandatory fields are present and well formed.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        let key = self.key()?;
        if key.version.is_reserved() {
            return Err(CoreError::ReservedVersion {
                entity_id: key.id.0,
            });
        }
        let schema_type = self.schema_type()?;
        self.schema_version(schema_type)?;
        Ok(())
    }

    /// Encodes to canonical CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be encoded (NaN floats).
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(to_canonical_cbor(&self.to_value())?)
    }

    /// Decodes from canonical CBOR and validates mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input or missing mandatory fields.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Self::from_value(from_cbor(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u64, version: u64) -> EntityKey {
        EntityKey::new(EntityId(id), Version(version))
    }

    #[test]
    fn mandatory_fields_are_set() {
        let doc = Document::new("Sample", 3, key(10, 20));
        assert_eq!(doc.entity_id().unwrap(), EntityId(10));
        assert_eq!(doc.version().unwrap(), Version(20));
        assert_eq!(doc.schema_type().unwrap(), "Sample");
        assert_eq!(doc.schema_version("Sample").unwrap(), 3);
        assert!(doc.get("SchemaVersion_Sample").is_some());
    }

    #[test]
    fn encode_decode_preserves_all_field_kinds() {
        let doc = Document::new("Sample", 1, key(10, 20))
            .with("Scale", 0.75)
            .with("Label", "outer")
            .with("Blob", vec![1u8, 2, 3])
            .with(
                "Nested",
                Value::map(vec![(Value::from("inner"), Value::Integer(-4))]),
            )
            .with("List", Value::Array(vec![Value::Integer(1), Value::Float(2.5)]));

        let bytes = doc.encode().unwrap();
        let decoded = Document::decode(&bytes).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(decoded.encode().unwrap(), bytes);
        assert_eq!(decoded.float("Scale").unwrap(), 0.75);
    }

    #[test]
    fn decode_rejects_missing_schema_version() {
        let mut doc = Document::new("Sample", 1, key(10, 20));
        doc.remove("SchemaVersion_Sample");
        let bytes = doc.encode().unwrap();
        assert!(matches!(
            Document::decode(&bytes),
            Err(CoreError::MissingField { .. })
        ));
    }

    #[test]
    fn decode_rejects_reserved_version() {
        let doc = Document::new("Sample", 1, key(10, 1));
        let bytes = doc.encode().unwrap();
        assert!(matches!(
            Document::decode(&bytes),
            Err(CoreError::ReservedVersion { entity_id: 10 })
        ));
    }

    #[test]
    fn typed_accessors_report_wrong_types() {
        let doc = Document::new("Sample", 1, key(10, 20)).with("Label", "x");
        assert!(matches!(
            doc.integer("Label"),
            Err(CoreError::InvalidField { .. })
        ));
        assert!(matches!(
            doc.text("Missing"),
            Err(CoreError::MissingField { .. })
        ));
    }
}
