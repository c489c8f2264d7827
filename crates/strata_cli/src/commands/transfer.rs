//! Import, commit and get command implementations.

use super::{CliResult, Format, Repository};
use serde::Serialize;
use std::path::Path;
use strata_sync_engine::{CommitOutcome, GetOutcome};

/// Result of an import or commit.
#[derive(Debug, Serialize)]
pub struct CommitReport {
    /// Project name.
    pub project: String,
    /// Registered version.
    pub version: String,
    /// Uploaded files, relative to the project directory.
    pub uploaded: Vec<String>,
    /// Logical paths reported deleted.
    pub deleted: Vec<String>,
}

impl CommitReport {
    fn new(project: &str, outcome: CommitOutcome) -> Self {
        Self {
            project: project.to_string(),
            version: outcome.version,
            uploaded: outcome
                .uploaded
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            deleted: outcome.deleted,
        }
    }
}

/// Result of a checkout.
#[derive(Debug, Serialize)]
pub struct GetReport {
    /// Project name.
    pub project: String,
    /// Checked-out version.
    pub version: String,
    /// Whether the local cache served the version.
    pub from_cache: bool,
    /// Files restored.
    pub files: usize,
}

/// Runs the import command.
pub fn import(
    repo: &Repository,
    file: &Path,
    project: &str,
    message: &str,
    include_results: bool,
    format: Format,
) -> CliResult<()> {
    let outcome = repo
        .engine()
        .import_project(file, project, message, include_results)?;
    format.print(&CommitReport::new(project, outcome), print_commit)
}

/// Runs the commit command.
pub fn commit(
    repo: &Repository,
    file: &Path,
    project: &str,
    message: &str,
    include_results: bool,
    format: Format,
) -> CliResult<()> {
    let outcome = repo
        .engine()
        .commit_project(file, project, message, include_results)?;
    format.print(&CommitReport::new(project, outcome), print_commit)
}

/// Runs the get command.
pub fn get(
    repo: &Repository,
    file: &Path,
    project: &str,
    version: &str,
    format: Format,
) -> CliResult<()> {
    let GetOutcome {
        version,
        from_cache,
        files,
    } = repo.engine().get_project(file, project, version)?;
    let report = GetReport {
        project: project.to_string(),
        version,
        from_cache,
        files,
    };
    format.print(&report, |r| {
        let source = if r.from_cache { "cache" } else { "repository" };
        println!(
            "{} is now at version {} ({} files from {source})",
            r.project, r.version, r.files
        );
    })
}

fn print_commit(report: &CommitReport) {
    println!("{} version {}", report.project, report.version);
    if report.uploaded.is_empty() && report.deleted.is_empty() {
        println!("  no changes");
        return;
    }
    for path in &report.uploaded {
        println!("  uploaded {path}");
    }
    for path in &report.deleted {
        println!("  deleted  {path}");
    }
}
