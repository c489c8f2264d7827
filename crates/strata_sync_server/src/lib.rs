//! # Strata Sync Server
//!
//! Reference model service for the Strata sync engine.
//!
//! This crate provides:
//! - Endpoints for id grants, commits, version files and version listings
//! - A version registry with optional JSON persistence
//! - Id allocation from an internal counter or a shared document backend
//!
//! # Architecture
//!
//! The server only tracks references. Clients write data and file entities
//! to the document backend themselves, then register a version listing the
//! `(id, version)` pairs. Each registered version holds the complete file
//! set, built from the previous version plus the committed changes.
//!
//! # Protocol
//!
//! A commit is:
//! 1. Client requests two id/version pairs per changed file
//! 2. Client stores the entities under those keys
//! 3. Client sends the file records and the deleted logical paths
//! 4. Server registers the version and returns its label

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod registry;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, IdSource, RequestHandler};
pub use registry::{Registry, VersionRecord};
pub use server::ModelServer;
