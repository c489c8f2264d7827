use super::{AnyEntity, Entity, EntityHeader, SchemaType};
use crate::document::Document;
use crate::error::CoreResult;

const FIELD_DATA: &str = "Data";

/// Opaque payload bytes, stored separately from the metadata that
/// references them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryData {
    header: EntityHeader,
    data: Vec<u8>,
}

impl BinaryData {
    /// Creates an unstored payload entity.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            header: EntityHeader::new(name),
            data,
        }
    }

    /// The payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Takes the payload.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Entity for BinaryData {
    const SCHEMA: SchemaType = SchemaType::BinaryData;

    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    fn write_fields(&self, document: &mut Document) {
        document.set(FIELD_DATA, self.data.as_slice());
    }

    fn read_fields(header: EntityHeader, document: &Document) -> CoreResult<Self> {
        Ok(Self {
            header,
            data: document.bytes(FIELD_DATA)?.to_vec(),
        })
    }

    fn from_any(entity: AnyEntity) -> CoreResult<Self> {
        match entity {
            AnyEntity::BinaryData(data) => Ok(data),
            other => Err(other.mismatch(Self::SCHEMA)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityId, EntityKey, Version};

    #[test]
    fn payload_survives_document() {
        let mut data = BinaryData::new("payload", vec![0, 255, 7]);
        data.header_mut().id = EntityId(3);
        data.header_mut().version = Version(4);

        let doc = data.to_document();
        let decoded = BinaryData::from_document(&Document::decode(&doc.encode().unwrap()).unwrap())
            .unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.key(), EntityKey::new(EntityId(3), Version(4)));
    }
}
