//! Main model server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, IdSource, RequestHandler};
use std::sync::Arc;
use strata_storage::DocumentBackend;
use strata_sync_engine::{LoopbackServer, COMMIT_PATH, FILES_PATH, IDS_PATH, VERSIONS_PATH};
use strata_sync_protocol::{
    CommitRequest, CommitResponse, IdGrant, IdRequest, ServiceMessage, VersionFiles, VersionList,
    VersionListRequest, VersionQuery,
};

/// The model server.
///
/// Grants entity ids and registers project versions. Entity payloads never
/// pass through it: clients write them to the document backend directly
/// and only send `(id, version)` references here.
///
/// # Example
///
/// ```
/// use strata_sync_server::{ModelServer, ServerConfig};
///
/// let server = ModelServer::new(ServerConfig::default()).unwrap();
/// assert_eq!(server.project_count(), 0);
///
/// // Expose `handle_post` behind HTTP, or hand the server to a
/// // `LoopbackClient` to run it in-process.
/// ```
pub struct ModelServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl ModelServer {
    /// Creates a model server with its own id counter.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured registry file cannot be loaded.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let ids = HandlerContext::counter(&config);
        Self::with_ids(config, ids)
    }

    /// Creates a model server that allocates ids from `backend`.
    ///
    /// Use this when clients store entities in the same backend, so that
    /// granted ids never collide with ids the backend hands out itself.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured registry file cannot be loaded.
    pub fn with_backend(
        config: ServerConfig,
        backend: Arc<dyn DocumentBackend>,
    ) -> ServerResult<Self> {
        Self::with_ids(config, IdSource::Backend(backend))
    }

    fn with_ids(config: ServerConfig, ids: IdSource) -> ServerResult<Self> {
        let context = Arc::new(HandlerContext::new(config, ids)?);
        let handler = RequestHandler::new(Arc::clone(&context));

        Ok(Self { handler, context })
    }

    /// Handles an id request.
    pub fn handle_ids(&self, request: IdRequest) -> Result<IdGrant, String> {
        self.handler.handle_ids(request).map_err(|e| e.to_string())
    }

    /// Handles a commit request.
    pub fn handle_commit(&self, request: CommitRequest) -> Result<CommitResponse, String> {
        self.handler.handle_commit(request).map_err(|e| e.to_string())
    }

    /// Handles a version file query.
    pub fn handle_version_files(&self, query: VersionQuery) -> Result<VersionFiles, String> {
        self.handler
            .handle_version_files(query)
            .map_err(|e| e.to_string())
    }

    /// Handles a version list request.
    pub fn handle_list_versions(&self, request: VersionListRequest) -> Result<VersionList, String> {
        self.handler
            .handle_list_versions(request)
            .map_err(|e| e.to_string())
    }

    /// Handles a service message (dispatches to the matching handler).
    pub fn handle_message(&self, message: ServiceMessage) -> Result<ServiceMessage, String> {
        match message {
            ServiceMessage::IdRequest(req) => self.handle_ids(req).map(ServiceMessage::IdGrant),
            ServiceMessage::CommitRequest(req) => {
                self.handle_commit(req).map(ServiceMessage::CommitResponse)
            }
            ServiceMessage::VersionQuery(req) => self
                .handle_version_files(req)
                .map(ServiceMessage::VersionFiles),
            ServiceMessage::VersionListRequest(req) => self
                .handle_list_versions(req)
                .map(ServiceMessage::VersionList),
            _ => Err("Unexpected message type".into()),
        }
    }

    /// Decodes a request body posted to `path`, handles it and encodes the
    /// response.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NoRoute`] for an unknown path, or a codec
    /// error for a malformed body.
    pub fn route(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let bytes = match path {
            IDS_PATH => self.handler.handle_ids(IdRequest::decode(body)?)?.encode()?,
            COMMIT_PATH => self
                .handler
                .handle_commit(CommitRequest::decode(body)?)?
                .encode()?,
            FILES_PATH => self
                .handler
                .handle_version_files(VersionQuery::decode(body)?)?
                .encode()?,
            VERSIONS_PATH => self
                .handler
                .handle_list_versions(VersionListRequest::decode(body)?)?
                .encode()?,
            other => return Err(ServerError::NoRoute(other.to_string())),
        };
        Ok(bytes)
    }

    /// Returns the number of registered projects.
    pub fn project_count(&self) -> usize {
        self.context.registry().project_count()
    }

    /// Returns the number of versions registered for `project`.
    pub fn version_count(&self, project: &str) -> usize {
        self.context
            .registry()
            .versions(project)
            .map_or(0, <[_]>::len)
    }
}

impl LoopbackServer for ModelServer {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.route(path, body).map_err(|e| e.to_string())
    }
}
