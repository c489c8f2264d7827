//! Transport layer abstraction for the model service.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use strata_sync_protocol::{
    CommitRequest, CommitResponse, IdGrant, IdRequest, VersionFiles, VersionList,
    VersionListRequest, VersionQuery,
};

/// A project service handles communication with the model service.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, loopback, mock for testing).
pub trait ProjectService: Send + Sync {
    /// Requests fresh entity ids and versions.
    fn request_ids(&self, request: &IdRequest) -> SyncResult<IdGrant>;

    /// Registers a new version.
    fn commit(&self, request: &CommitRequest) -> SyncResult<CommitResponse>;

    /// Lists the files of a version.
    fn version_files(&self, query: &VersionQuery) -> SyncResult<VersionFiles>;

    /// Lists the versions of a project.
    fn list_versions(&self, request: &VersionListRequest) -> SyncResult<VersionList>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock service for testing.
///
/// Every call is counted, including calls made while disconnected.
#[derive(Debug)]
pub struct MockService {
    connected: AtomicBool,
    calls: AtomicU64,
    grant: Mutex<Option<IdGrant>>,
    commit_response: Mutex<Option<CommitResponse>>,
    version_files: Mutex<Option<VersionFiles>>,
    version_list: Mutex<Option<VersionList>>,
    last_commit: Mutex<Option<CommitRequest>>,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    /// Creates a new connected mock service without responses.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            calls: AtomicU64::new(0),
            grant: Mutex::new(None),
            commit_response: Mutex::new(None),
            version_files: Mutex::new(None),
            version_list: Mutex::new(None),
            last_commit: Mutex::new(None),
        }
    }

    /// Sets the id grant.
    pub fn set_grant(&self, grant: IdGrant) {
        *self.grant.lock() = Some(grant);
    }

    /// Sets the commit response.
    pub fn set_commit_response(&self, response: CommitResponse) {
        *self.commit_response.lock() = Some(response);
    }

    /// Sets the version file list.
    pub fn set_version_files(&self, files: VersionFiles) {
        *self.version_files.lock() = Some(files);
    }

    /// Sets the version list.
    pub fn set_version_list(&self, list: VersionList) {
        *self.version_list.lock() = Some(list);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The last commit request received.
    pub fn last_commit(&self) -> Option<CommitRequest> {
        self.last_commit.lock().clone()
    }

    fn respond<T: Clone>(&self, slot: &Mutex<Option<T>>, what: &str) -> SyncResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        slot.lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol(format!("No mock {what} response set")))
    }
}

impl ProjectService for MockService {
    fn request_ids(&self, _request: &IdRequest) -> SyncResult<IdGrant> {
        self.respond(&self.grant, "id grant")
    }

    fn commit(&self, request: &CommitRequest) -> SyncResult<CommitResponse> {
        *self.last_commit.lock() = Some(request.clone());
        self.respond(&self.commit_response, "commit")
    }

    fn version_files(&self, _query: &VersionQuery) -> SyncResult<VersionFiles> {
        self.respond(&self.version_files, "version files")
    }

    fn list_versions(&self, _request: &VersionListRequest) -> SyncResult<VersionList> {
        self.respond(&self.version_list, "version list")
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
