//! Protocol messages between the sync engine and the model service.

use crate::fields::{key, missing, unsigned_list, unsigned_value, Fields};
use serde::{Deserialize, Serialize};
use strata_codec::{to_canonical_cbor, CodecError, CodecResult, Value};

/// A model service message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceMessage {
    /// Id request.
    IdRequest(IdRequest),
    /// Id grant.
    IdGrant(IdGrant),
    /// Commit request.
    CommitRequest(CommitRequest),
    /// Commit response.
    CommitResponse(CommitResponse),
    /// Version query.
    VersionQuery(VersionQuery),
    /// Files of a version.
    VersionFiles(VersionFiles),
    /// Version list request.
    VersionListRequest(VersionListRequest),
    /// Version list.
    VersionList(VersionList),
}

impl ServiceMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            ServiceMessage::IdRequest(_) => 1,
            ServiceMessage::IdGrant(_) => 2,
            ServiceMessage::CommitRequest(_) => 3,
            ServiceMessage::CommitResponse(_) => 4,
            ServiceMessage::VersionQuery(_) => 5,
            ServiceMessage::VersionFiles(_) => 6,
            ServiceMessage::VersionListRequest(_) => 7,
            ServiceMessage::VersionList(_) => 8,
        }
    }
}

/// `(id, version)` address of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity id.
    pub id: u64,
    /// Entity version.
    pub version: u64,
}

impl EntityRef {
    /// Creates a new reference.
    pub fn new(id: u64, version: u64) -> Self {
        Self { id, version }
    }

    fn to_value(self) -> Value {
        Value::Array(vec![unsigned_value(self.id), unsigned_value(self.version)])
    }

    fn from_value(value: &Value, name: &str) -> CodecResult<Self> {
        let parts = value.as_array().map(|a| unsigned_list(a, name)).transpose()?;
        match parts.as_deref() {
            Some([id, version]) => Ok(Self::new(*id, *version)),
            _ => Err(CodecError::invalid_structure(format!("invalid {name}"))),
        }
    }
}

/// One uploaded file of a committed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Logical path, e.g. `Files/Result/a.txt`.
    pub logical_path: String,
    /// File metadata entity.
    pub file: EntityRef,
    /// Payload entity.
    pub data: EntityRef,
}

impl FileRecord {
    /// Creates a new record.
    pub fn new(logical_path: impl Into<String>, file: EntityRef, data: EntityRef) -> Self {
        Self {
            logical_path: logical_path.into(),
            file,
            data,
        }
    }

    fn to_value(&self) -> Value {
        Value::map(vec![
            (key("path"), Value::Text(self.logical_path.clone())),
            (key("file"), self.file.to_value()),
            (key("data"), self.data.to_value()),
        ])
    }

    fn from_value(value: &Value) -> CodecResult<Self> {
        let fields = Fields::from_value(value.clone())?;
        Ok(Self {
            logical_path: fields.text("path")?,
            file: EntityRef::from_value(fields.get("file").ok_or_else(|| missing("file"))?, "file")?,
            data: EntityRef::from_value(fields.get("data").ok_or_else(|| missing("data"))?, "data")?,
        })
    }
}

fn records_to_value(records: &[FileRecord]) -> Value {
    Value::Array(records.iter().map(FileRecord::to_value).collect())
}

fn records_from_fields(fields: &Fields, name: &str) -> CodecResult<Vec<FileRecord>> {
    fields.array(name).iter().map(FileRecord::from_value).collect()
}

fn texts_from_fields(fields: &Fields, name: &str) -> CodecResult<Vec<String>> {
    fields
        .array(name)
        .iter()
        .map(|v| {
            v.as_text()
                .map(str::to_string)
                .ok_or_else(|| CodecError::invalid_structure(format!("invalid {name} entry")))
        })
        .collect()
}

fn with_error(mut pairs: Vec<(Value, Value)>, error: Option<&String>) -> Value {
    if let Some(error) = error {
        pairs.push((key("error"), Value::Text(error.clone())));
    }
    Value::map(pairs)
}

/// Request for fresh entity ids and versions.
#[derive(Debug, Clone, PartialEq)]
pub struct IdRequest {
    /// Project the ids are for.
    pub project: String,
    /// Number of `(id, version)` pairs wanted.
    pub count: u32,
}

impl IdRequest {
    /// Creates a new id request.
    pub fn new(project: impl Into<String>, count: u32) -> Self {
        Self {
            project: project.into(),
            count,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let pairs = vec![
            (key("project"), Value::Text(self.project.clone())),
            (key("count"), Value::Integer(i64::from(self.count))),
        ];
        to_canonical_cbor(&Value::map(pairs))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let fields = Fields::decode(bytes)?;
        let count = u32::try_from(fields.unsigned("count")?)
            .map_err(|_| CodecError::invalid_structure("count out of range"))?;
        Ok(Self {
            project: fields.text("project")?,
            count,
        })
    }
}

/// Granted entity ids and versions, index-aligned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdGrant {
    /// Fresh entity ids.
    pub entity_ids: Vec<u64>,
    /// Fresh versions, one per id.
    pub versions: Vec<u64>,
    /// Error message if the request was refused.
    pub error: Option<String>,
}

impl IdGrant {
    /// Creates a grant.
    pub fn new(entity_ids: Vec<u64>, versions: Vec<u64>) -> Self {
        Self {
            entity_ids,
            versions,
            error: None,
        }
    }

    /// Creates a refusal.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let pairs = vec![
            (
                key("entity_ids"),
                Value::Array(self.entity_ids.iter().map(|&n| unsigned_value(n)).collect()),
            ),
            (
                key("versions"),
                Value::Array(self.versions.iter().map(|&n| unsigned_value(n)).collect()),
            ),
        ];
        to_canonical_cbor(&with_error(pairs, self.error.as_ref()))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let fields = Fields::decode(bytes)?;
        Ok(Self {
            entity_ids: unsigned_list(fields.array("entity_ids"), "entity_ids")?,
            versions: unsigned_list(fields.array("versions"), "versions")?,
            error: fields.optional_text("error"),
        })
    }
}

/// Registers a new project version.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    /// Client that produced the version.
    pub client_id: String,
    /// Project name.
    pub project: String,
    /// Change comment.
    pub message: String,
    /// New or changed files.
    pub files: Vec<FileRecord>,
    /// Logical paths removed since the previous version.
    pub deleted: Vec<String>,
}

impl CommitRequest {
    /// Creates a commit request without files.
    pub fn new(
        client_id: impl Into<String>,
        project: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            project: project.into(),
            message: message.into(),
            files: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let pairs = vec![
            (key("client_id"), Value::Text(self.client_id.clone())),
            (key("project"), Value::Text(self.project.clone())),
            (key("message"), Value::Text(self.message.clone())),
            (key("files"), records_to_value(&self.files)),
            (
                key("deleted"),
                Value::Array(self.deleted.iter().cloned().map(Value::Text).collect()),
            ),
        ];
        to_canonical_cbor(&Value::map(pairs))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let fields = Fields::decode(bytes)?;
        Ok(Self {
            client_id: fields.text("client_id")?,
            project: fields.text("project")?,
            message: fields.optional_text("message").unwrap_or_default(),
            files: records_from_fields(&fields, "files")?,
            deleted: texts_from_fields(&fields, "deleted")?,
        })
    }
}

/// Outcome of a commit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitResponse {
    /// Whether the version was registered.
    pub success: bool,
    /// Label of the new version.
    pub version: String,
    /// Error message if failed.
    pub error: Option<String>,
}

impl CommitResponse {
    /// Creates a successful response.
    pub fn success(version: impl Into<String>) -> Self {
        Self {
            success: true,
            version: version.into(),
            error: None,
        }
    }

    /// Creates a failed response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let pairs = vec![
            (key("success"), Value::Bool(self.success)),
            (key("version"), Value::Text(self.version.clone())),
        ];
        to_canonical_cbor(&with_error(pairs, self.error.as_ref()))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let fields = Fields::decode(bytes)?;
        Ok(Self {
            success: fields.boolean("success"),
            version: fields.optional_text("version").unwrap_or_default(),
            error: fields.optional_text("error"),
        })
    }
}

/// Asks for the complete file list of a version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionQuery {
    /// Project name.
    pub project: String,
    /// Version label.
    pub version: String,
}

impl VersionQuery {
    /// Creates a new query.
    pub fn new(project: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let pairs = vec![
            (key("project"), Value::Text(self.project.clone())),
            (key("version"), Value::Text(self.version.clone())),
        ];
        to_canonical_cbor(&Value::map(pairs))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let fields = Fields::decode(bytes)?;
        Ok(Self {
            project: fields.text("project")?,
            version: fields.text("version")?,
        })
    }
}

/// Every file of a version with its entity pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VersionFiles {
    /// Whether the version exists.
    pub success: bool,
    /// Files of the version.
    pub files: Vec<FileRecord>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl VersionFiles {
    /// Creates a successful response.
    pub fn success(files: Vec<FileRecord>) -> Self {
        Self {
            success: true,
            files,
            error: None,
        }
    }

    /// Creates a failed response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let pairs = vec![
            (key("success"), Value::Bool(self.success)),
            (key("files"), records_to_value(&self.files)),
        ];
        to_canonical_cbor(&with_error(pairs, self.error.as_ref()))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let fields = Fields::decode(bytes)?;
        Ok(Self {
            success: fields.boolean("success"),
            files: records_from_fields(&fields, "files")?,
            error: fields.optional_text("error"),
        })
    }
}

/// Asks for the version history of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionListRequest {
    /// Project name.
    pub project: String,
}

impl VersionListRequest {
    /// Creates a new request.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(&Value::map(vec![(
            key("project"),
            Value::Text(self.project.clone()),
        )]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Ok(Self {
            project: Fields::decode(bytes)?.text("project")?,
        })
    }
}

/// Summary of one registered version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Version label.
    pub label: String,
    /// Change comment.
    pub message: String,
    /// Number of files in the version.
    pub file_count: u64,
}

/// Version history of a project, oldest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VersionList {
    /// Registered versions.
    pub versions: Vec<VersionSummary>,
}

impl VersionList {
    /// Creates a new list.
    pub fn new(versions: Vec<VersionSummary>) -> Self {
        Self { versions }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let versions = self
            .versions
            .iter()
            .map(|v| {
                Value::map(vec![
                    (key("label"), Value::Text(v.label.clone())),
                    (key("message"), Value::Text(v.message.clone())),
                    (key("file_count"), unsigned_value(v.file_count)),
                ])
            })
            .collect();
        to_canonical_cbor(&Value::map(vec![(key("versions"), Value::Array(versions))]))
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let fields = Fields::decode(bytes)?;
        let versions = fields
            .array("versions")
            .iter()
            .map(|v| {
                let entry = Fields::from_value(v.clone())?;
                Ok(VersionSummary {
                    label: entry.text("label")?,
                    message: entry.optional_text("message").unwrap_or_default(),
                    file_count: entry.unsigned("file_count")?,
                })
            })
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self { versions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, base: u64) -> FileRecord {
        FileRecord::new(
            path,
            EntityRef::new(base, base + 1),
            EntityRef::new(base + 2, base + 3),
        )
    }

    #[test]
    fn id_grant_keeps_alignment() {
        let grant = IdGrant::new(vec![10, 11, 12, 13], vec![20, 21, 22, 23]);
        let decoded = IdGrant::decode(&grant.encode().unwrap()).unwrap();
        assert_eq!(decoded, grant);
        assert!(decoded.error.is_none());
    }

    #[test]
    fn commit_request_carries_files_and_deletions() {
        let mut request = CommitRequest::new("client-1", "foo", "second");
        request.files.push(record("Files/foo/Result/a.txt", 40));
        request.deleted.push("Files/foo/Result/b.txt".into());

        let decoded = CommitRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn commit_response_error() {
        let response = CommitResponse::error("unknown project");
        let decoded = CommitResponse::decode(&response.encode().unwrap()).unwrap();
        assert!(!decoded.success);
        assert_eq!(decoded.error.as_deref(), Some("unknown project"));
    }

    #[test]
    fn version_files_roundtrip() {
        let files = VersionFiles::success(vec![record("Files/foo.main", 2), record("Files/x", 8)]);
        let decoded = VersionFiles::decode(&files.encode().unwrap()).unwrap();
        assert_eq!(decoded, files);
    }

    #[test]
    fn version_list_roundtrip() {
        let list = VersionList::new(vec![VersionSummary {
            label: "1".into(),
            message: "initial".into(),
            file_count: 3,
        }]);
        assert_eq!(VersionList::decode(&list.encode().unwrap()).unwrap(), list);
    }

    #[test]
    fn malformed_entity_ref_is_rejected() {
        let bad = Value::map(vec![(
            key("files"),
            Value::Array(vec![Value::map(vec![
                (key("path"), Value::Text("Files/a".into())),
                (key("file"), Value::Array(vec![Value::Integer(1)])),
                (key("data"), Value::Array(vec![Value::Integer(2), Value::Integer(3)])),
            ])]),
        )]);
        let bytes = to_canonical_cbor(&bad).unwrap();
        assert!(VersionFiles::decode(&bytes).is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let bytes = to_canonical_cbor(&Value::map(vec![(key("count"), Value::Integer(2))])).unwrap();
        assert!(IdRequest::decode(&bytes).is_err());
    }

    #[test]
    fn message_type_codes() {
        assert_eq!(ServiceMessage::IdRequest(IdRequest::new("p", 1)).type_code(), 1);
        assert_eq!(ServiceMessage::IdGrant(IdGrant::default()).type_code(), 2);
        assert_eq!(
            ServiceMessage::CommitResponse(CommitResponse::success("1")).type_code(),
            4
        );
        assert_eq!(
            ServiceMessage::VersionList(VersionList::default()).type_code(),
            8
        );
    }
}
