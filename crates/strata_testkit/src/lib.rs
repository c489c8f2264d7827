//! # Strata Testkit
//!
//! Test utilities for Strata.
//!
//! This crate provides:
//! - Project working trees on disk with controllable modification times
//! - Entity stores over in-memory and file backends
//! - Sync engines wired to an in-process model server
//! - Property-based test generators using proptest
//! - Store and directory-tree verification helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata_testkit::prelude::*;
//!
//! #[test]
//! fn import_creates_cache() {
//!     let fixture = SyncFixture::new();
//!     let project = scenarios::foo_project();
//!     fixture
//!         .engine
//!         .import_project(project.root_file(), "foo", "initial", true)
//!         .unwrap();
//!     assert!(project.cache_dir().is_dir());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
