//! Registered project versions.

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use strata_sync_protocol::{FileRecord, VersionSummary};

/// One registered version: the complete file set, not a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Version label.
    pub label: String,
    /// Change comment.
    pub message: String,
    /// Client that committed the version.
    pub client_id: String,
    /// Files by logical path.
    pub files: BTreeMap<String, FileRecord>,
}

impl VersionRecord {
    /// Summary for version listings.
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            label: self.label.clone(),
            message: self.message.clone(),
            file_count: self.files.len() as u64,
        }
    }
}

/// Version history of all projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    projects: BTreeMap<String, Vec<VersionRecord>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the registry from `path`; empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O or registry error.
    pub fn load(path: &Path) -> ServerResult<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Saves the registry using write-then-rename.
    ///
    /// # Errors
    ///
    /// Returns an I/O or registry error.
    pub fn save(&self, path: &Path) -> ServerResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Versions of `project`, oldest first.
    pub fn versions(&self, project: &str) -> Option<&[VersionRecord]> {
        self.projects.get(project).map(Vec::as_slice)
    }

    /// A version of `project` by label.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownProject`] or
    /// [`ServerError::UnknownVersion`].
    pub fn version(&self, project: &str, label: &str) -> ServerResult<&VersionRecord> {
        let versions = self
            .versions(project)
            .ok_or_else(|| ServerError::UnknownProject(project.to_string()))?;
        versions
            .iter()
            .find(|v| v.label == label)
            .ok_or_else(|| ServerError::UnknownVersion {
                project: project.to_string(),
                version: label.to_string(),
            })
    }

    /// Number of known projects.
    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// Appends a version built from the latest one: `deleted` paths are
    /// removed, then `files` are added or replaced.
    ///
    /// `label` receives the 1-based position of the new version.
    pub fn append(
        &mut self,
        project: &str,
        label: impl FnOnce(usize) -> String,
        message: &str,
        client_id: &str,
        files: Vec<FileRecord>,
        deleted: &[String],
    ) -> &VersionRecord {
        let versions = self.projects.entry(project.to_string()).or_default();
        let mut current = versions
            .last()
            .map(|v| v.files.clone())
            .unwrap_or_default();
        for path in deleted {
            current.remove(path);
        }
        for record in files {
            current.insert(record.logical_path.clone(), record);
        }
        let index = versions.len();
        versions.push(VersionRecord {
            label: label(index + 1),
            message: message.to_string(),
            client_id: client_id.to_string(),
            files: current,
        });
        &versions[index]
    }
}
