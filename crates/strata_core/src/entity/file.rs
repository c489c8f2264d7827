use super::{AnyEntity, Entity, EntityHeader, SchemaType};
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::types::{EntityId, EntityKey, Version};

const FIELD_PATH: &str = "Path";
const FIELD_FILE_NAME: &str = "FileName";
const FIELD_PATH_KIND: &str = "PathKind";
const FIELD_DATA_ID: &str = "DataID";
const FIELD_DATA_VERSION: &str = "DataVersion";

/// How [`FileEntity::path`] is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Absolute path on the machine that uploaded the file.
    Absolute,
    /// Path relative to the project directory.
    Relative,
}

impl PathKind {
    fn as_str(self) -> &'static str {
        match self {
            PathKind::Absolute => "Absolute",
            PathKind::Relative => "Relative",
        }
    }

    fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "Absolute" => Ok(PathKind::Absolute),
            "Relative" => Ok(PathKind::Relative),
            _ => Err(CoreError::invalid_field(FIELD_PATH_KIND, "Absolute or Relative")),
        }
    }
}

/// File metadata: logical name, source path and the payload entity.
///
/// The header name holds the logical name (`Files/<relative path>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntity {
    header: EntityHeader,
    path: String,
    file_name: String,
    path_kind: PathKind,
    data: Option<EntityKey>,
}

impl FileEntity {
    /// Creates unstored, read-only file metadata without a payload
    /// reference.
    pub fn new(logical_name: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let file_name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            header: EntityHeader::new(logical_name).with_editable(false),
            path,
            file_name,
            path_kind: PathKind::Absolute,
            data: None,
        }
    }

    /// Sets the payload reference.
    #[must_use]
    pub fn with_data(mut self, data: EntityKey) -> Self {
        self.data = Some(data);
        self
    }

    /// Logical name, e.g. `Files/Result/a.txt`.
    #[must_use]
    pub fn logical_name(&self) -> &str {
        &self.header.name
    }

    /// Source path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name without directories.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Path interpretation.
    #[must_use]
    pub fn path_kind(&self) -> PathKind {
        self.path_kind
    }

    /// Key of the [`super::BinaryData`] payload.
    #[must_use]
    pub fn data(&self) -> Option<EntityKey> {
        self.data
    }
}

#[allow(clippy::cast_possible_wrap)]
fn as_field(raw: u64) -> i64 {
    raw as i64
}

impl Entity for FileEntity {
    const SCHEMA: SchemaType = SchemaType::File;

    fn header(&self) -> &EntityHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self.header
    }

    fn write_fields(&self, document: &mut Document) {
        document.set(FIELD_PATH, self.path.as_str());
        document.set(FIELD_FILE_NAME, self.file_name.as_str());
        document.set(FIELD_PATH_KIND, self.path_kind.as_str());
        if let Some(data) = self.data {
            document.set(FIELD_DATA_ID, as_field(data.id.0));
            document.set(FIELD_DATA_VERSION, as_field(data.version.0));
        }
    }

    fn read_fields(header: EntityHeader, document: &Document) -> CoreResult<Self> {
        let data = if document.get(FIELD_DATA_ID).is_some() {
            Some(EntityKey::new(
                EntityId(document.unsigned(FIELD_DATA_ID)?),
                Version(document.unsigned(FIELD_DATA_VERSION)?),
            ))
        } else {
            None
        };
        Ok(Self {
            header,
            path: document.text(FIELD_PATH)?.to_string(),
            file_name: document.text(FIELD_FILE_NAME)?.to_string(),
            path_kind: PathKind::parse(document.text(FIELD_PATH_KIND)?)?,
            data,
        })
    }

    fn from_any(entity: AnyEntity) -> CoreResult<Self> {
        match entity {
            AnyEntity::File(file) => Ok(file),
            other => Err(other.mismatch(Self::SCHEMA)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_defaults() {
        let file = FileEntity::new("Files/Result/a.txt", "/work/proj/Result/a.txt");
        assert_eq!(file.file_name(), "a.txt");
        assert_eq!(file.path_kind(), PathKind::Absolute);
        assert!(!file.header().editable);
        assert!(file.data().is_none());
    }

    #[test]
    fn data_reference_survives_document() {
        let data = EntityKey::new(EntityId(20), Version(21));
        let mut file = FileEntity::new("Files/a.txt", "C:\\proj\\a.txt").with_data(data);
        file.header_mut().id = EntityId(22);
        file.header_mut().version = Version(23);
        assert_eq!(file.file_name(), "a.txt");

        let decoded = FileEntity::from_document(&file.to_document()).unwrap();
        assert_eq!(decoded.data(), Some(data));
        assert_eq!(decoded, file);
    }

    #[test]
    fn bad_path_kind_is_rejected() {
        let mut file = FileEntity::new("Files/a.txt", "/a.txt");
        file.header_mut().id = EntityId(2);
        file.header_mut().version = Version(3);
        let doc = file.to_document().with("PathKind", "Sideways");
        assert!(matches!(
            FileEntity::from_document(&doc),
            Err(CoreError::InvalidField { .. })
        ));
    }
}
