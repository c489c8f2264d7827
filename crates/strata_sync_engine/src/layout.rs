//! Working tree and cache folder layout of a project.
//!
//! For a root document `dir/foo.main` the base is `dir/foo`, the cache
//! folder is `dir/foo.cache` and every snapshot lives in
//! `dir/foo.cache/<version>/`, mirroring the layout relative to `dir`.

use crate::config::ResultLayout;
use crate::error::{SyncError, SyncResult};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Prefix of every logical file path.
pub const LOGICAL_PREFIX: &str = "Files/";

/// Name of the manifest file inside the cache folder.
pub const MANIFEST_FILE: &str = "version.info";

/// Paths derived from a project's root document.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root_file: PathBuf,
    directory: PathBuf,
    base: PathBuf,
    base_name: String,
    results: ResultLayout,
}

impl ProjectLayout {
    /// Derives the layout of the project rooted at `file`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPath`] if the file name has no
    /// extension.
    pub fn new(file: impl AsRef<Path>, results: ResultLayout) -> SyncResult<Self> {
        let root_file = file.as_ref().to_path_buf();
        let invalid = || SyncError::InvalidPath {
            path: root_file.clone(),
        };
        let base_name = root_file
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?
            .to_string();
        if root_file.extension().is_none() {
            return Err(invalid());
        }
        let directory = root_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let base = directory.join(&base_name);
        Ok(Self {
            root_file,
            directory,
            base,
            base_name,
            results,
        })
    }

    /// The root document.
    pub fn root_file(&self) -> &Path {
        &self.root_file
    }

    /// Directory holding the root document.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Root document path without its extension.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// File stem of the root document.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Result layout in use.
    pub fn results(&self) -> &ResultLayout {
        &self.results
    }

    /// `<base>.cache`.
    pub fn cache_dir(&self) -> PathBuf {
        let mut name = OsString::from(self.base.as_os_str());
        name.push(".cache");
        PathBuf::from(name)
    }

    /// `<base>.cache/version.info`.
    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir().join(MANIFEST_FILE)
    }

    /// Checks that `version` names a single folder below the cache folder.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPath`] for an empty label, `.` or `..`,
    /// and labels containing a path separator or NUL.
    pub fn check_version(version: &str) -> SyncResult<()> {
        let valid = !matches!(version, "" | "." | "..") && !version.contains(['/', '\\', '\0']);
        if valid {
            Ok(())
        } else {
            Err(SyncError::InvalidPath {
                path: PathBuf::from(version),
            })
        }
    }

    /// Snapshot folder of `version`. Labels are not checked here; see
    /// [`check_version`](Self::check_version).
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.cache_dir().join(version)
    }

    /// Path of the root document relative to [`directory`](Self::directory).
    pub fn root_relative(&self) -> PathBuf {
        self.root_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default()
    }

    /// Absolute working path of a relative project path.
    pub fn working_path(&self, relative: &Path) -> PathBuf {
        self.directory.join(relative)
    }

    /// Working files of the project as paths relative to the directory.
    ///
    /// The root document comes first if it exists; result files follow in
    /// sorted order when `include_results` is set.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if a directory cannot be read.
    pub fn working_files(&self, include_results: bool) -> SyncResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        if self.root_file.is_file() {
            files.push(self.root_relative());
        }
        if include_results {
            files.extend(self.result_files()?);
        }
        Ok(files)
    }

    /// Result files, relative and sorted.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if a directory cannot be read.
    pub fn result_files(&self) -> SyncResult<BTreeSet<PathBuf>> {
        match &self.results {
            ResultLayout::Siblings => self.sibling_results(),
            ResultLayout::Folder(name) => {
                let folder = self.base.join(name);
                if !folder.is_dir() {
                    return Ok(BTreeSet::new());
                }
                files_below(&folder, &self.directory)
            }
        }
    }

    fn sibling_results(&self) -> SyncResult<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();
        let prefix = format!("{}.", self.base_name);
        let root_extension = self
            .root_file
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        let listing = if self.directory.as_os_str().is_empty() {
            Path::new(".")
        } else {
            &self.directory
        };
        let entries =
            std::fs::read_dir(listing).map_err(|e| SyncError::filesystem(listing, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::filesystem(listing, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            let extension = path.extension().map(|e| e.to_string_lossy().to_lowercase());
            if extension == root_extension {
                continue;
            }
            files.insert(PathBuf::from(name));
        }
        Ok(files)
    }

    /// Files of the snapshot `version`, relative to its folder.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if the snapshot cannot be read.
    pub fn snapshot_files(&self, version: &str) -> SyncResult<BTreeSet<PathBuf>> {
        let dir = self.version_dir(version);
        if !dir.is_dir() {
            return Ok(BTreeSet::new());
        }
        files_below(&dir, &dir)
    }

    /// Logical path of a relative project path: `Files/<path>` with `/`
    /// separators.
    pub fn logical_path(relative: &Path) -> String {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        format!("{LOGICAL_PREFIX}{}", parts.join("/"))
    }

    /// Relative project path of a logical path; `None` if the prefix is
    /// missing or a segment would escape the project directory.
    pub fn relative_path(logical: &str) -> Option<PathBuf> {
        let rest = logical.strip_prefix(LOGICAL_PREFIX)?;
        let mut path = PathBuf::new();
        for segment in rest.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => return None,
                s => path.push(s),
            }
        }
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }
}

fn files_below(dir: &Path, relative_to: &Path) -> SyncResult<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            SyncError::filesystem(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(relative_to) {
            files.insert(relative.to_path_buf());
        }
    }
    Ok(files)
}
