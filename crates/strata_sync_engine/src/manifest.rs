//! The `version.info` manifest of a cache folder.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Records which project and version a cache folder holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    /// File stem of the root document.
    pub base_name: String,
    /// Project name on the model service.
    pub project: String,
    /// Version currently checked out.
    pub version: String,
}

impl VersionManifest {
    /// Creates a manifest.
    pub fn new(
        base_name: impl Into<String>,
        project: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            base_name: base_name.into(),
            project: project.into(),
            version: version.into(),
        }
    }

    /// Reads the manifest at `path`; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a filesystem or manifest error.
    pub fn load(path: &Path) -> SyncResult<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::filesystem(path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| SyncError::Manifest {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Writes the manifest using write-then-rename.
    ///
    /// # Errors
    ///
    /// Returns a filesystem or manifest error.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| SyncError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        let temp_path = path.with_extension("info.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| SyncError::filesystem(&temp_path, e))?;
        file.write_all(&json)
            .and_then(|()| file.sync_all())
            .map_err(|e| SyncError::filesystem(&temp_path, e))?;
        drop(file);
        fs::rename(&temp_path, path).map_err(|e| SyncError::filesystem(path, e))
    }

    /// Fails unless the manifest belongs to `project`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CacheConsistency`] on a mismatch.
    pub fn ensure_project(&self, project: &str) -> SyncResult<()> {
        if self.project == project {
            Ok(())
        } else {
            Err(SyncError::consistency(format!(
                "cache folder belongs to project '{}', not '{project}'",
                self.project
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("version.info");
        let manifest = VersionManifest::new("foo", "Foo", "2");

        manifest.save(&path).unwrap();
        assert_eq!(VersionManifest::load(&path).unwrap(), Some(manifest));
        assert!(!dir.path().join("version.info.tmp").exists());
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(VersionManifest::load(&dir.path().join("version.info")).unwrap(), None);
    }

    #[test]
    fn corrupt_manifest_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("version.info");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            VersionManifest::load(&path),
            Err(SyncError::Manifest { .. })
        ));
    }

    #[test]
    fn project_mismatch() {
        let manifest = VersionManifest::new("foo", "Foo", "1");
        assert!(manifest.ensure_project("Foo").is_ok());
        assert!(matches!(
            manifest.ensure_project("Bar"),
            Err(SyncError::CacheConsistency { .. })
        ));
    }
}
