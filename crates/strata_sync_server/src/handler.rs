//! Request handlers for model service endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::registry::Registry;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use strata_storage::DocumentBackend;
use strata_sync_protocol::{
    CommitRequest, CommitResponse, EntityRef, IdGrant, IdRequest, VersionFiles, VersionList,
    VersionListRequest, VersionQuery,
};
use tracing::{debug, info};

/// Where granted ids come from.
pub enum IdSource {
    /// Counter owned by the server.
    Counter(Mutex<u64>),
    /// The document backend's counter, shared with every store writing to it.
    Backend(Arc<dyn DocumentBackend>),
}

impl IdSource {
    fn allocate(&self, count: usize) -> ServerResult<Vec<u64>> {
        match self {
            IdSource::Counter(next) => {
                let mut next = next.lock();
                let start = *next;
                *next += count as u64;
                Ok((start..*next).collect())
            }
            IdSource::Backend(backend) => Ok(backend.allocate_ids(count)?),
        }
    }
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Version registry.
    registry: RwLock<Registry>,
    ids: IdSource,
}

impl HandlerContext {
    /// Creates a new handler context, loading a persisted registry if one
    /// is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry file cannot be read.
    pub fn new(config: ServerConfig, ids: IdSource) -> ServerResult<Self> {
        let registry = match &config.registry_path {
            Some(path) => Registry::load(path)?,
            None => Registry::new(),
        };
        Ok(Self {
            config,
            registry: RwLock::new(registry),
            ids,
        })
    }

    /// Id source with the internal counter starting at `config.first_id`.
    pub fn counter(config: &ServerConfig) -> IdSource {
        IdSource::Counter(Mutex::new(config.first_id))
    }

    /// Snapshot of the registry.
    pub fn registry(&self) -> Registry {
        self.registry.read().clone()
    }
}

/// Handler for model service requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Grants `2 × count` ids and as many versions.
    pub fn handle_ids(&self, request: IdRequest) -> ServerResult<IdGrant> {
        let max = self.context.config.max_id_batch;
        if request.count == 0 || request.count > max {
            return Ok(IdGrant::error(format!(
                "Invalid id count {}: expected 1..={max}",
                request.count
            )));
        }
        let wanted = 2 * request.count as usize;
        let entity_ids = self.context.ids.allocate(wanted)?;
        let versions = self.context.ids.allocate(wanted)?;
        debug!(project = %request.project, files = request.count, "granted ids");
        Ok(IdGrant::new(entity_ids, versions))
    }

    /// Registers a version on top of the project's latest one.
    pub fn handle_commit(&self, request: CommitRequest) -> ServerResult<CommitResponse> {
        if let Err(e) = validate_commit(&request) {
            return Ok(CommitResponse::error(e.to_string()));
        }

        let mut registry = self.context.registry.write();
        let config = &self.context.config;
        let record = registry.append(
            &request.project,
            |n| config.label(n),
            &request.message,
            &request.client_id,
            request.files,
            &request.deleted,
        );
        let label = record.label.clone();
        let file_count = record.files.len();

        if let Some(path) = &config.registry_path {
            registry.save(path)?;
        }
        info!(project = %request.project, version = %label, files = file_count, "registered version");
        Ok(CommitResponse::success(label))
    }

    /// Lists every file of a version with its entity pair.
    pub fn handle_version_files(&self, query: VersionQuery) -> ServerResult<VersionFiles> {
        let registry = self.context.registry.read();
        match registry.version(&query.project, &query.version) {
            Ok(record) => Ok(VersionFiles::success(record.files.values().cloned().collect())),
            Err(e) if e.is_client_error() => Ok(VersionFiles::error(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Lists the versions of a project; empty for an unknown project.
    pub fn handle_list_versions(&self, request: VersionListRequest) -> ServerResult<VersionList> {
        let registry = self.context.registry.read();
        let versions = registry
            .versions(&request.project)
            .map(|versions| versions.iter().map(|v| v.summary()).collect())
            .unwrap_or_default();
        Ok(VersionList::new(versions))
    }
}

fn validate_commit(request: &CommitRequest) -> ServerResult<()> {
    if request.project.is_empty() {
        return Err(ServerError::InvalidRequest("empty project name".into()));
    }
    let valid = |r: EntityRef| r.id > 1 && r.version > 1;
    for file in &request.files {
        if !file.logical_path.starts_with("Files/") {
            return Err(ServerError::InvalidRequest(format!(
                "invalid logical path {}",
                file.logical_path
            )));
        }
        if !valid(file.file) || !valid(file.data) {
            return Err(ServerError::InvalidRequest(format!(
                "invalid entity reference for {}",
                file.logical_path
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_sync_protocol::FileRecord;

    fn create_handler() -> RequestHandler {
        let config = ServerConfig::default();
        let ids = HandlerContext::counter(&config);
        let context = Arc::new(HandlerContext::new(config, ids).unwrap());
        RequestHandler::new(context)
    }

    fn record(path: &str, base: u64) -> FileRecord {
        FileRecord::new(
            path,
            EntityRef::new(base, base + 1),
            EntityRef::new(base + 2, base + 3),
        )
    }

    #[test]
    fn ids_are_fresh_and_aligned() {
        let handler = create_handler();
        let first = handler.handle_ids(IdRequest::new("foo", 2)).unwrap();
        assert_eq!(first.entity_ids, vec![2, 3, 4, 5]);
        assert_eq!(first.versions, vec![6, 7, 8, 9]);

        let second = handler.handle_ids(IdRequest::new("foo", 1)).unwrap();
        assert_eq!(second.entity_ids, vec![10, 11]);
    }

    #[test]
    fn zero_ids_is_refused() {
        let handler = create_handler();
        let grant = handler.handle_ids(IdRequest::new("foo", 0)).unwrap();
        assert!(grant.error.is_some());
        assert!(grant.entity_ids.is_empty());
    }

    #[test]
    fn commit_and_query() {
        let handler = create_handler();
        let mut request = CommitRequest::new("c", "foo", "first");
        request.files = vec![record("Files/foo.main", 10), record("Files/foo/Result/b.txt", 20)];
        assert_eq!(handler.handle_commit(request).unwrap().version, "1");

        let mut request = CommitRequest::new("c", "foo", "second");
        request.deleted = vec!["Files/foo/Result/b.txt".into()];
        assert_eq!(handler.handle_commit(request).unwrap().version, "2");

        let v1 = handler
            .handle_version_files(VersionQuery::new("foo", "1"))
            .unwrap();
        assert_eq!(v1.files.len(), 2);
        let v2 = handler
            .handle_version_files(VersionQuery::new("foo", "2"))
            .unwrap();
        assert_eq!(v2.files, vec![record("Files/foo.main", 10)]);

        let list = handler
            .handle_list_versions(VersionListRequest::new("foo"))
            .unwrap();
        assert_eq!(list.versions.len(), 2);
        assert_eq!(list.versions[1].message, "second");
    }

    #[test]
    fn unknown_version_is_error_response() {
        let handler = create_handler();
        let response = handler
            .handle_version_files(VersionQuery::new("foo", "1"))
            .unwrap();
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[test]
    fn reserved_version_is_refused() {
        let handler = create_handler();
        let mut request = CommitRequest::new("c", "foo", "bad");
        request.files = vec![FileRecord::new(
            "Files/a",
            EntityRef::new(5, 1),
            EntityRef::new(6, 7),
        )];
        let response = handler.handle_commit(request).unwrap();
        assert!(!response.success);
        assert!(handler
            .handle_list_versions(VersionListRequest::new("foo"))
            .unwrap()
            .versions
            .is_empty());
    }
}
