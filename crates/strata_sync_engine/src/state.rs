//! Sync engine state machine.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::fmt;
use std::time::Instant;

/// A user-facing engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Validate a project and read its version.
    Open,
    /// First upload of a project.
    Import,
    /// Upload of the changes since the last version.
    Commit,
    /// Checkout of a version.
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Open => "open",
            Operation::Import => "import",
            Operation::Commit => "commit",
            Operation::Get => "get",
        };
        f.write_str(name)
    }
}

/// The current state of the sync engine.
///
/// `Idle → {Open | Import | Commit | Get} → Transferring → Finalizing → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No operation in flight.
    Idle,
    /// Validating a project.
    Open,
    /// Preparing an import.
    Import,
    /// Preparing a commit.
    Commit,
    /// Preparing a checkout.
    Get,
    /// Uploading or downloading entities.
    Transferring,
    /// Registering the version and updating the local cache.
    Finalizing,
}

impl SyncState {
    /// Returns true while an operation is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

impl From<Operation> for SyncState {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Open => SyncState::Open,
            Operation::Import => SyncState::Import,
            Operation::Commit => SyncState::Commit,
            Operation::Get => SyncState::Get,
        }
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Operations that finished successfully.
    pub operations_completed: u64,
    /// Operations that failed.
    pub operations_failed: u64,
    /// Files uploaded.
    pub files_uploaded: u64,
    /// Logical paths reported deleted.
    pub files_deleted: u64,
    /// Files downloaded from the store.
    pub files_downloaded: u64,
    /// Checkouts served from the local cache.
    pub cache_hits: u64,
    /// Time of the last successful operation.
    pub last_success_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Owns the engine state for one operation and returns it to `Idle` on
/// drop, on every path.
pub(crate) struct StateGuard<'a> {
    state: &'a RwLock<SyncState>,
}

impl<'a> StateGuard<'a> {
    /// Moves `state` from `Idle` into `operation`.
    pub(crate) fn enter(state: &'a RwLock<SyncState>, operation: Operation) -> SyncResult<Self> {
        let mut current = state.write();
        if current.is_active() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *current),
                to: format!("{:?}", SyncState::from(operation)),
            });
        }
        *current = operation.into();
        Ok(Self { state })
    }

    /// Advances to a later phase.
    pub(crate) fn advance(&self, next: SyncState) {
        *self.state.write() = next;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.state.write() = SyncState::Idle;
    }
}
