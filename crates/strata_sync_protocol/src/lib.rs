//! # Strata Sync Protocol
//!
//! Messages exchanged between the sync engine and the model service, with
//! their canonical CBOR codecs.
//!
//! The model service is the authority on project versions. The engine:
//! 1. Requests fresh `(id, version)` pairs for the entities it will upload
//! 2. Uploads payload and file entities to the document store itself
//! 3. Registers the new version with one commit message listing every
//!    changed file and every deleted logical path
//! 4. Queries the file list of a version when downloading it
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod fields;
mod messages;

pub use messages::{
    CommitRequest, CommitResponse, EntityRef, FileRecord, IdGrant, IdRequest, ServiceMessage,
    VersionFiles, VersionList, VersionListRequest, VersionQuery, VersionSummary,
};
