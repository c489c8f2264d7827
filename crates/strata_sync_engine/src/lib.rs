//! # Strata Sync Engine
//!
//! Incremental project synchronization on top of the Strata entity store.
//!
//! This crate provides:
//! - Sync state machine (idle → import/commit/get → transferring → finalizing)
//! - Project layout and local version cache (`<base>.cache/<version>/`)
//! - Change detection (modification time, then bytes)
//! - Model service transport abstraction (HTTP, loopback, mock)
//! - Progress and completion signals
//! - A tokio worker wrapper for the blocking operations
//!
//! ## Architecture
//!
//! A commit uploads only what changed since the checked-out version:
//! 1. Classify working files against the cached snapshot
//! 2. Request one data and one file `(id, version)` pair per changed file
//! 3. Store payload and file entities through the write queue
//! 4. Register the version with the model service
//! 5. Snapshot the working files into the cache under the new version
//!
//! A checkout restores from the cache when it can and downloads otherwise.
//!
//! ## Key Invariants
//!
//! - One operation in flight per engine
//! - Every operation ends in `Idle` with a success or error signal
//! - A cached version is restored without network access
//! - A cache folder belongs to exactly one project

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod detect;
mod engine;
mod error;
mod http;
mod layout;
mod manifest;
mod progress;
mod state;
mod task;
mod transport;

pub use config::{Milestones, ResultLayout, SyncConfig, DEFAULT_RESULT_FOLDER};
pub use detect::{ChangeDetector, FileStatus, UploadPlan, COMPARE_BLOCK_SIZE};
pub use engine::{CommitOutcome, GetOutcome, ProjectStatus, SyncEngine, UploadKeys};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpTransport, LoopbackClient, LoopbackServer, WireMessage,
    COMMIT_PATH, FILES_PATH, IDS_PATH, VERSIONS_PATH,
};
pub use layout::{ProjectLayout, LOGICAL_PREFIX, MANIFEST_FILE};
pub use manifest::VersionManifest;
pub use progress::{NullProgress, ProgressEvent, ProgressLog, ProgressSink};
pub use state::{Operation, SyncState, SyncStats};
pub use task::AsyncSyncEngine;
pub use transport::{MockService, ProjectService};
