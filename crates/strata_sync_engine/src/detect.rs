//! Change detection between the working tree and a cached snapshot.

use crate::error::{SyncError, SyncResult};
use crate::layout::ProjectLayout;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Block size of the byte comparison.
pub const COMPARE_BLOCK_SIZE: usize = 4096;

/// How a working file relates to its cached copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Not in the snapshot.
    New,
    /// Same modification time as the cached copy.
    Unchanged,
    /// Modification time differs but the bytes are equal.
    Touched,
    /// Bytes differ.
    Modified,
}

impl FileStatus {
    /// Returns true if the file has to be uploaded.
    pub fn needs_upload(self) -> bool {
        matches!(self, FileStatus::New | FileStatus::Modified)
    }
}

/// Compares working files against cached copies.
///
/// Equal modification times are trusted; otherwise the sizes and then the
/// contents are compared.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    /// Classifies `working` against `cached`.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if either file cannot be read.
    pub fn compare(working: &Path, cached: &Path) -> SyncResult<FileStatus> {
        let cached_meta = match fs::metadata(cached) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FileStatus::New),
            Err(e) => return Err(SyncError::filesystem(cached, e)),
        };
        let working_meta = fs::metadata(working).map_err(|e| SyncError::filesystem(working, e))?;

        let working_time = working_meta.modified().map_err(|e| SyncError::filesystem(working, e))?;
        let cached_time = cached_meta.modified().map_err(|e| SyncError::filesystem(cached, e))?;
        if working_time == cached_time {
            return Ok(FileStatus::Unchanged);
        }

        if Self::files_equal(working, cached)? {
            Ok(FileStatus::Touched)
        } else {
            Ok(FileStatus::Modified)
        }
    }

    /// Byte-for-byte comparison: size first, then 4096-byte blocks.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if either file cannot be read.
    pub fn files_equal(a: &Path, b: &Path) -> SyncResult<bool> {
        let len_a = fs::metadata(a).map_err(|e| SyncError::filesystem(a, e))?.len();
        let len_b = fs::metadata(b).map_err(|e| SyncError::filesystem(b, e))?.len();
        if len_a != len_b {
            return Ok(false);
        }

        let mut file_a = File::open(a).map_err(|e| SyncError::filesystem(a, e))?;
        let mut file_b = File::open(b).map_err(|e| SyncError::filesystem(b, e))?;
        let mut block_a = [0u8; COMPARE_BLOCK_SIZE];
        let mut block_b = [0u8; COMPARE_BLOCK_SIZE];
        loop {
            let read_a = read_block(&mut file_a, &mut block_a).map_err(|e| SyncError::filesystem(a, e))?;
            let read_b = read_block(&mut file_b, &mut block_b).map_err(|e| SyncError::filesystem(b, e))?;
            if read_a != read_b || block_a[..read_a] != block_b[..read_b] {
                return Ok(false);
            }
            if read_a == 0 {
                return Ok(true);
            }
        }
    }
}

/// Fills `buf` as far as the file allows.
fn read_block(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Result of comparing a working tree with its last snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPlan {
    /// Files to upload, relative to the project directory, root first.
    pub uploads: Vec<PathBuf>,
    /// Logical paths of snapshot files that are gone.
    pub deleted: Vec<String>,
    /// Files considered, uploaded or not.
    pub considered: Vec<PathBuf>,
}

impl UploadPlan {
    /// Returns true if nothing is uploaded or deleted.
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.deleted.is_empty()
    }

    /// Computes the plan for `layout` against the snapshot `prior`.
    ///
    /// Without a prior snapshot every working file is new. Snapshot files
    /// that are gone, or excluded because `include_results` is off, become
    /// deletions.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if a file cannot be compared.
    pub fn determine(
        layout: &ProjectLayout,
        prior: Option<&str>,
        include_results: bool,
    ) -> SyncResult<Self> {
        let considered = layout.working_files(include_results)?;
        let snapshot = match prior {
            Some(version) => layout.snapshot_files(version)?,
            None => BTreeSet::new(),
        };

        let mut uploads = Vec::new();
        for relative in &considered {
            let status = match prior {
                Some(version) if snapshot.contains(relative) => ChangeDetector::compare(
                    &layout.working_path(relative),
                    &layout.version_dir(version).join(relative),
                )?,
                _ => FileStatus::New,
            };
            debug!(file = %relative.display(), ?status, "classified");
            if status.needs_upload() {
                uploads.push(relative.clone());
            }
        }

        let deleted = snapshot
            .iter()
            .filter(|relative| !considered.contains(relative))
            .map(|relative| ProjectLayout::logical_path(relative))
            .collect();

        Ok(Self {
            uploads,
            deleted,
            considered,
        })
    }
}
