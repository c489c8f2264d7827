//! Status and versions command implementations.

use super::{CliResult, Format, Repository};
use serde::Serialize;
use std::path::Path;

/// Local state of a project.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Project name.
    pub project: String,
    /// Checked-out version.
    pub version: String,
    /// Cache folder.
    pub cache_dir: String,
    /// Files a commit would upload.
    pub modified: Vec<String>,
    /// Logical paths a commit would report deleted.
    pub deleted: Vec<String>,
}

/// One registered version.
#[derive(Debug, Serialize)]
pub struct VersionEntry {
    /// Version label.
    pub version: String,
    /// Change comment.
    pub message: String,
    /// Number of files in the version.
    pub files: u64,
}

/// Runs the status command.
pub fn status(
    repo: &Repository,
    file: &Path,
    project: &str,
    include_results: bool,
    format: Format,
) -> CliResult<()> {
    let engine = repo.engine();
    let opened = engine.open_project(file, project)?;
    let plan = engine.pending_changes(file, project, include_results)?;

    let report = StatusReport {
        project: opened.project,
        version: opened.version,
        cache_dir: opened.cache_dir.display().to_string(),
        modified: plan
            .uploads
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        deleted: plan.deleted,
    };
    format.print(&report, |r| {
        println!("{} at version {}", r.project, r.version);
        println!("  cache: {}", r.cache_dir);
        if r.modified.is_empty() && r.deleted.is_empty() {
            println!("  working tree clean");
        }
        for path in &r.modified {
            println!("  modified {path}");
        }
        for path in &r.deleted {
            println!("  deleted  {path}");
        }
    })
}

/// Runs the versions command.
pub fn versions(repo: &Repository, project: &str, format: Format) -> CliResult<()> {
    let entries: Vec<VersionEntry> = repo
        .engine()
        .list_versions(project)?
        .into_iter()
        .map(|v| VersionEntry {
            version: v.label,
            message: v.message,
            files: v.file_count,
        })
        .collect();

    format.print(&entries, |entries| {
        if entries.is_empty() {
            println!("{project} has no versions");
        }
        for entry in entries {
            println!("{:>6}  {:>5} files  {}", entry.version, entry.files, entry.message);
        }
    })
}
