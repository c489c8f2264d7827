//! Hash command implementation.

use super::{CliError, CliResult, Format};
use serde::Serialize;
use std::fs;
use std::path::Path;
use strata_core::ContentHasher;

/// Digest of a mesh file.
#[derive(Debug, Serialize)]
pub struct HashReport {
    /// Hashed file.
    pub path: String,
    /// Order-independent SHA-256 digest, lowercase hex.
    pub digest: String,
}

/// Runs the hash command on an ASCII STL file.
pub fn run(path: &Path, format: Format) -> CliResult<()> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let report = HashReport {
        path: path.display().to_string(),
        digest: ContentHasher::digest_ascii_stl(&text)?,
    };
    format.print(&report, |r| println!("{}  {}", r.digest, r.path))
}
