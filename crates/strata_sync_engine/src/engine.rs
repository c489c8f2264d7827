//! The project sync engine.

use crate::config::{Milestones, SyncConfig};
use crate::detect::UploadPlan;
use crate::error::{SyncError, SyncResult};
use crate::layout::ProjectLayout;
use crate::manifest::VersionManifest;
use crate::progress::{NullProgress, ProgressSink};
use crate::state::{Operation, StateGuard, SyncState, SyncStats};
use crate::transport::ProjectService;
use parking_lot::RwLock;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use strata_core::{
    load, BinaryData, Entity, EntityId, EntityKey, EntityStore, FileEntity, Version,
};
use strata_sync_protocol::{
    CommitRequest, EntityRef, FileRecord, IdRequest, VersionListRequest, VersionQuery,
    VersionSummary,
};
use tracing::{debug, info, warn};

/// Keys granted for one uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadKeys {
    /// Payload entity.
    pub data: EntityKey,
    /// File metadata entity.
    pub file: EntityKey,
}

/// A validated project under version control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStatus {
    /// File stem of the root document.
    pub base_name: String,
    /// Project name on the model service.
    pub project: String,
    /// Version checked out locally.
    pub version: String,
    /// Cache folder.
    pub cache_dir: PathBuf,
}

/// Outcome of an import or commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Label of the registered version.
    pub version: String,
    /// Files uploaded, relative to the project directory.
    pub uploaded: Vec<PathBuf>,
    /// Logical paths reported deleted.
    pub deleted: Vec<String>,
}

/// Outcome of a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOutcome {
    /// Version checked out.
    pub version: String,
    /// Whether the version came from the local cache.
    pub from_cache: bool,
    /// Files restored into the working tree.
    pub files: usize,
}

/// Synchronizes project working trees with the model service.
///
/// I/O is blocking; see [`AsyncSyncEngine`](crate::AsyncSyncEngine) for a
/// worker-thread wrapper. One operation runs at a time.
pub struct SyncEngine<S: ProjectService> {
    config: SyncConfig,
    store: Arc<EntityStore>,
    service: Arc<S>,
    progress: Arc<dyn ProgressSink>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<S: ProjectService> SyncEngine<S> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, store: Arc<EntityStore>, service: S) -> Self {
        Self::with_service(config, store, Arc::new(service))
    }

    /// Creates a new sync engine sharing `service`.
    pub fn with_service(config: SyncConfig, store: Arc<EntityStore>, service: Arc<S>) -> Self {
        Self {
            config,
            store,
            service,
            progress: Arc::new(NullProgress),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the entity store.
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Returns the project service.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Layout of the project rooted at `file` with the configured results.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPath`] for a path without extension.
    pub fn layout(&self, file: &Path) -> SyncResult<ProjectLayout> {
        ProjectLayout::new(file, self.config.results.clone())
    }

    // ---- validation -------------------------------------------------

    /// Checks that `file` is a project root under version control for
    /// `project`.
    ///
    /// A missing file is accepted when `ensure_project_exists` is off and
    /// no cache folder exists.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidPath`] if the path has no extension
    /// - [`SyncError::ProjectMissing`] if the file is missing and must exist
    /// - [`SyncError::CacheConsistency`] if a cache folder exists without
    ///   the file, or belongs to another project
    /// - [`SyncError::NotUnderVersionControl`] if the file has no cache
    pub fn check_valid_local_file(
        &self,
        file: &Path,
        project: &str,
        ensure_project_exists: bool,
    ) -> SyncResult<ProjectLayout> {
        let layout = self.layout(file)?;
        let cache_exists = layout.cache_dir().is_dir();

        if !layout.root_file().is_file() {
            if ensure_project_exists {
                return Err(SyncError::ProjectMissing {
                    path: layout.root_file().to_path_buf(),
                });
            }
            if cache_exists {
                return Err(SyncError::consistency(format!(
                    "cache folder {} exists but the project file is missing",
                    layout.cache_dir().display()
                )));
            }
            return Ok(layout);
        }

        if !cache_exists {
            return Err(SyncError::NotUnderVersionControl {
                path: layout.root_file().to_path_buf(),
            });
        }
        if let Some(manifest) = VersionManifest::load(&layout.manifest_path())? {
            manifest.ensure_project(project)?;
        }
        Ok(layout)
    }

    /// Version checked out in the cache folder of `file`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotUnderVersionControl`] without a cache
    /// folder, and [`SyncError::CacheConsistency`] for a missing or
    /// foreign manifest.
    pub fn current_version(&self, file: &Path, project: &str) -> SyncResult<String> {
        let layout = self.layout(file)?;
        Self::manifest_version(&layout, project)
    }

    fn manifest_version(layout: &ProjectLayout, project: &str) -> SyncResult<String> {
        if !layout.cache_dir().is_dir() {
            return Err(SyncError::NotUnderVersionControl {
                path: layout.root_file().to_path_buf(),
            });
        }
        let manifest = VersionManifest::load(&layout.manifest_path())?.ok_or_else(|| {
            SyncError::consistency(format!(
                "cache folder {} has no version manifest",
                layout.cache_dir().display()
            ))
        })?;
        manifest.ensure_project(project)?;
        ProjectLayout::check_version(&manifest.version).map_err(|_| {
            SyncError::consistency(format!(
                "version manifest names an invalid version {:?}",
                manifest.version
            ))
        })?;
        Ok(manifest.version)
    }

    // ---- operations -------------------------------------------------

    /// Validates a local project and reports its checked-out version.
    ///
    /// # Errors
    ///
    /// See [`check_valid_local_file`](Self::check_valid_local_file) and
    /// [`current_version`](Self::current_version).
    pub fn open_project(&self, file: &Path, project: &str) -> SyncResult<ProjectStatus> {
        self.run(
            Operation::Open,
            |status: &ProjectStatus| format!("project {} at version {}", status.project, status.version),
            |_| {
                let layout = self.check_valid_local_file(file, project, true)?;
                let version = Self::manifest_version(&layout, project)?;
                Ok(ProjectStatus {
                    base_name: layout.base_name().to_string(),
                    project: project.to_string(),
                    version,
                    cache_dir: layout.cache_dir(),
                })
            },
        )
    }

    /// Uploads a project for the first time and creates its cache folder.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CacheAlreadyExists`] if the project already
    /// has a cache folder, and any transfer error. A failed import removes
    /// the cache folder again so it can be retried; entities already
    /// written stay in the store.
    pub fn import_project(
        &self,
        file: &Path,
        project: &str,
        message: &str,
        include_results: bool,
    ) -> SyncResult<CommitOutcome> {
        self.run(Operation::Import, describe_commit, |guard| {
            let layout = self.layout(file)?;
            let cache_dir = layout.cache_dir();
            if cache_dir.exists() {
                return Err(SyncError::CacheAlreadyExists { path: cache_dir });
            }
            if !layout.root_file().is_file() {
                return Err(SyncError::ProjectMissing {
                    path: layout.root_file().to_path_buf(),
                });
            }
            fs::create_dir_all(&cache_dir).map_err(|e| SyncError::filesystem(&cache_dir, e))?;

            let result = self
                .determine_upload_files(&layout, None, include_results)
                .and_then(|plan| {
                    self.report(Operation::Import, self.config.milestones.planned);
                    self.transfer(guard, Operation::Import, &layout, project, message, plan)
                });
            if result.is_err() {
                discard_partial(&cache_dir);
            }
            result
        })
    }

    /// Uploads the changes since the checked-out version.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the project is not under version
    /// control for `project`, and any transfer error.
    pub fn commit_project(
        &self,
        file: &Path,
        project: &str,
        comment: &str,
        include_results: bool,
    ) -> SyncResult<CommitOutcome> {
        self.run(Operation::Commit, describe_commit, |guard| {
            let layout = self.check_valid_local_file(file, project, true)?;
            let prior = Self::manifest_version(&layout, project)?;

            let plan = self.determine_upload_files(&layout, Some(&prior), include_results)?;
            self.report(Operation::Commit, self.config.milestones.planned);
            self.transfer(guard, Operation::Commit, &layout, project, comment, plan)
        })
    }

    /// Replaces the working files with `version`.
    ///
    /// A version present in the cache folder is restored without any
    /// network access; otherwise it is downloaded into the cache first.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPath`] for a version label that does not
    /// name a single cache folder, before anything is touched;
    /// [`SyncError::CacheConsistency`] if the cache folder belongs to
    /// another project; [`SyncError::RestoreFailed`] if the download
    /// fails, and filesystem errors.
    pub fn get_project(&self, file: &Path, project: &str, version: &str) -> SyncResult<GetOutcome> {
        self.run(
            Operation::Get,
            |outcome: &GetOutcome| format!("restored version {}", outcome.version),
            |guard| {
                ProjectLayout::check_version(version)?;
                let layout = self.layout(file)?;
                let cache_dir = layout.cache_dir();
                if cache_dir.is_dir() {
                    if let Some(manifest) = VersionManifest::load(&layout.manifest_path())? {
                        manifest.ensure_project(project)?;
                    }
                } else {
                    fs::create_dir_all(&cache_dir)
                        .map_err(|e| SyncError::filesystem(&cache_dir, e))?;
                }

                self.delete_working_files(&layout)?;
                self.report(Operation::Get, self.config.milestones.cleared);

                if self.restore_from_cache(&layout, project, version)? {
                    self.stats.write().cache_hits += 1;
                    self.report(Operation::Get, self.config.milestones.restored);
                    return Ok(GetOutcome {
                        version: version.to_string(),
                        from_cache: true,
                        files: layout.snapshot_files(version)?.len(),
                    });
                }

                self.report(Operation::Get, self.config.milestones.download_start);
                guard.advance(SyncState::Transferring);
                let restore_failed = |source: SyncError| SyncError::RestoreFailed {
                    version: version.to_string(),
                    source: Box::new(source),
                };
                let downloaded = match self.download(&layout, project, version) {
                    Ok(count) => count,
                    Err(e) => {
                        discard_partial(&layout.version_dir(version));
                        return Err(restore_failed(e));
                    }
                };
                self.stats.write().files_downloaded += downloaded as u64;

                guard.advance(SyncState::Finalizing);
                if !self.restore_from_cache(&layout, project, version)? {
                    return Err(restore_failed(SyncError::consistency(
                        "downloaded version is missing from the cache",
                    )));
                }
                self.report(Operation::Get, self.config.milestones.restored);
                Ok(GetOutcome {
                    version: version.to_string(),
                    from_cache: false,
                    files: downloaded,
                })
            },
        )
    }

    /// Changes a commit of `file` would upload, without uploading.
    ///
    /// # Errors
    ///
    /// Returns a validation or filesystem error.
    pub fn pending_changes(
        &self,
        file: &Path,
        project: &str,
        include_results: bool,
    ) -> SyncResult<UploadPlan> {
        let layout = self.check_valid_local_file(file, project, true)?;
        let prior = Self::manifest_version(&layout, project)?;
        self.determine_upload_files(&layout, Some(&prior), include_results)
    }

    /// Versions registered for `project`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub fn list_versions(&self, project: &str) -> SyncResult<Vec<VersionSummary>> {
        Ok(self
            .service
            .list_versions(&VersionListRequest::new(project))?
            .versions)
    }

    // ---- steps --------------------------------------------------------

    /// Compares the working tree with the snapshot `prior`.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error.
    pub fn determine_upload_files(
        &self,
        layout: &ProjectLayout,
        prior: Option<&str>,
        include_results: bool,
    ) -> SyncResult<UploadPlan> {
        let plan = UploadPlan::determine(layout, prior, include_results)?;
        info!(
            project = layout.base_name(),
            uploads = plan.uploads.len(),
            deleted = plan.deleted.len(),
            "determined upload set"
        );
        Ok(plan)
    }

    fn transfer(
        &self,
        guard: &StateGuard<'_>,
        operation: Operation,
        layout: &ProjectLayout,
        project: &str,
        message: &str,
        plan: UploadPlan,
    ) -> SyncResult<CommitOutcome> {
        guard.advance(SyncState::Transferring);
        self.connect_store(project)?;
        let keys = self.request_keys(project, plan.uploads.len())?;
        let records = self.upload(operation, layout, &plan.uploads, &keys)?;

        guard.advance(SyncState::Finalizing);
        let version = self.finalize(project, message, records, &plan.deleted)?;
        ProjectLayout::check_version(&version).map_err(|_| {
            SyncError::Protocol(format!("server registered an invalid version label {version:?}"))
        })?;
        self.copy_files(layout, project, &version, &plan.considered)?;

        let mut stats = self.stats.write();
        stats.files_uploaded += plan.uploads.len() as u64;
        stats.files_deleted += plan.deleted.len() as u64;
        drop(stats);

        Ok(CommitOutcome {
            version,
            uploaded: plan.uploads,
            deleted: plan.deleted,
        })
    }

    fn connect_store(&self, project: &str) -> SyncResult<()> {
        let url = &self.config.server_url;
        if !self.store.connect(url) {
            return Err(SyncError::transport_retryable(format!(
                "document store unreachable at {url}"
            )));
        }
        self.store.set_collection(&self.config.collection_for(project))?;
        Ok(())
    }

    /// Requests one data and one file key pair per file.
    ///
    /// File `i` gets data id `ids[2i]` and file id `ids[2i + 1]`, and the
    /// versions at the same positions.
    fn request_keys(&self, project: &str, files: usize) -> SyncResult<Vec<UploadKeys>> {
        if files == 0 {
            return Ok(Vec::new());
        }
        let count = u32::try_from(files)
            .map_err(|_| SyncError::Protocol(format!("too many files: {files}")))?;
        let grant = self.service.request_ids(&IdRequest::new(project, count))?;
        if let Some(error) = grant.error {
            return Err(SyncError::ServerError(error));
        }
        let wanted = 2 * files;
        if grant.entity_ids.len() != wanted || grant.versions.len() != wanted {
            return Err(SyncError::Protocol(format!(
                "granted {} ids and {} versions, expected {wanted} each",
                grant.entity_ids.len(),
                grant.versions.len()
            )));
        }
        let key = |i: usize| EntityKey::new(EntityId(grant.entity_ids[i]), Version(grant.versions[i]));
        Ok((0..files)
            .map(|i| UploadKeys {
                data: key(2 * i),
                file: key(2 * i + 1),
            })
            .collect())
    }

    /// Stores a payload and a file entity per file through the write
    /// queue. The queue is flushed and disabled on every path.
    fn upload(
        &self,
        operation: Operation,
        layout: &ProjectLayout,
        files: &[PathBuf],
        keys: &[UploadKeys],
    ) -> SyncResult<Vec<FileRecord>> {
        self.store.set_queue_writing(true)?;
        let result = self.upload_files(operation, layout, files, keys);
        let flushed = self.store.set_queue_writing(false);
        let records = result?;
        flushed?;
        self.report(operation, self.config.milestones.uploaded);
        Ok(records)
    }

    fn upload_files(
        &self,
        operation: Operation,
        layout: &ProjectLayout,
        files: &[PathBuf],
        keys: &[UploadKeys],
    ) -> SyncResult<Vec<FileRecord>> {
        let milestones = self.config.milestones;
        let mut records = Vec::with_capacity(files.len());
        for (i, (relative, keys)) in files.iter().zip(keys).enumerate() {
            self.report(
                operation,
                Milestones::between(milestones.planned, milestones.uploaded, i, files.len()),
            );
            let path = layout.working_path(relative);
            let bytes = fs::read(&path).map_err(|e| SyncError::filesystem(&path, e))?;
            let logical = ProjectLayout::logical_path(relative);

            let mut data = BinaryData::new(logical.clone(), bytes);
            data.header_mut().id = keys.data.id;
            data.store_as(&self.store, keys.data.version)?;

            let absolute = std::path::absolute(&path).map_err(|e| SyncError::filesystem(&path, e))?;
            let mut entity =
                FileEntity::new(logical.clone(), absolute.to_string_lossy()).with_data(keys.data);
            entity.header_mut().id = keys.file.id;
            entity.store_as(&self.store, keys.file.version)?;

            debug!(file = %logical, data = %keys.data, entity = %keys.file, "uploaded");
            records.push(FileRecord::new(
                logical,
                EntityRef::new(keys.file.id.0, keys.file.version.0),
                EntityRef::new(keys.data.id.0, keys.data.version.0),
            ));
        }
        Ok(records)
    }

    fn finalize(
        &self,
        project: &str,
        message: &str,
        files: Vec<FileRecord>,
        deleted: &[String],
    ) -> SyncResult<String> {
        let mut request = CommitRequest::new(self.config.client_id.to_string(), project, message);
        request.files = files;
        request.deleted = deleted.to_vec();

        let response = self.service.commit(&request)?;
        if !response.success {
            return Err(SyncError::ServerError(
                response
                    .error
                    .unwrap_or_else(|| "commit rejected".to_string()),
            ));
        }
        info!(project, version = %response.version, "version registered");
        Ok(response.version)
    }

    /// Snapshots `files` into `<cache>/<version>` and records the version
    /// in the manifest. Modification times are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPath`] for an invalid version label, and
    /// filesystem or manifest errors.
    pub fn copy_files(
        &self,
        layout: &ProjectLayout,
        project: &str,
        version: &str,
        files: &[PathBuf],
    ) -> SyncResult<()> {
        ProjectLayout::check_version(version)?;
        let target = layout.version_dir(version);
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| SyncError::filesystem(&target, e))?;
        }
        fs::create_dir_all(&target).map_err(|e| SyncError::filesystem(&target, e))?;
        for relative in files {
            copy_preserving(&layout.working_path(relative), &target.join(relative))?;
        }
        VersionManifest::new(layout.base_name(), project, version).save(&layout.manifest_path())?;
        debug!(version, files = files.len(), "cached version");
        Ok(())
    }

    /// Copies a cached version into the working tree and records it in
    /// the manifest. Returns false, touching nothing, if the version is
    /// not cached.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPath`] for an invalid version label, and
    /// filesystem or manifest errors.
    pub fn restore_from_cache(
        &self,
        layout: &ProjectLayout,
        project: &str,
        version: &str,
    ) -> SyncResult<bool> {
        ProjectLayout::check_version(version)?;
        let source = layout.version_dir(version);
        if !source.is_dir() {
            return Ok(false);
        }
        let files = layout.snapshot_files(version)?;
        for relative in &files {
            copy_preserving(&source.join(relative), &layout.working_path(relative))?;
        }
        VersionManifest::new(layout.base_name(), project, version).save(&layout.manifest_path())?;
        info!(version, files = files.len(), "restored from cache");
        Ok(true)
    }

    /// Downloads every file of `version` into `<cache>/<version>`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPath`] for an invalid version label, and
    /// transport, store or filesystem errors.
    pub fn download(&self, layout: &ProjectLayout, project: &str, version: &str) -> SyncResult<usize> {
        ProjectLayout::check_version(version)?;
        self.connect_store(project)?;
        let response = self
            .service
            .version_files(&VersionQuery::new(project, version))?;
        if !response.success {
            return Err(SyncError::ServerError(
                response
                    .error
                    .unwrap_or_else(|| format!("unknown version {version}")),
            ));
        }

        let keys: Vec<EntityKey> = response
            .files
            .iter()
            .flat_map(|record| [entity_key(record.file), entity_key(record.data)])
            .collect();
        let prefetched = self.store.fetch_batch(&keys)?;
        debug!(requested = keys.len(), prefetched, "prefetched version entities");

        let target = layout.version_dir(version);
        fs::create_dir_all(&target).map_err(|e| SyncError::filesystem(&target, e))?;

        let milestones = self.config.milestones;
        let total = response.files.len();
        for (i, record) in response.files.iter().enumerate() {
            self.report(
                Operation::Get,
                Milestones::between(milestones.download_start, milestones.restored, i, total),
            );
            let relative = ProjectLayout::relative_path(&record.logical_path).ok_or_else(|| {
                SyncError::Protocol(format!("invalid logical path {}", record.logical_path))
            })?;
            let entity: FileEntity = load(&self.store, entity_key(record.file))?;
            let data_key = entity.data().unwrap_or_else(|| entity_key(record.data));
            let data: BinaryData = load(&self.store, data_key)?;

            let path = target.join(&relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| SyncError::filesystem(parent, e))?;
            }
            fs::write(&path, data.data()).map_err(|e| SyncError::filesystem(&path, e))?;
            debug!(file = %record.logical_path, "downloaded");
        }
        Ok(total)
    }

    fn delete_working_files(&self, layout: &ProjectLayout) -> SyncResult<()> {
        for relative in layout.working_files(true)? {
            let path = layout.working_path(&relative);
            fs::remove_file(&path).map_err(|e| SyncError::filesystem(&path, e))?;
        }
        Ok(())
    }

    // ---- signals --------------------------------------------------------

    fn report(&self, operation: Operation, percent: u8) {
        self.progress.on_progress(operation, percent.min(100));
    }

    /// Runs one operation: enters its state, reports 0 and 100 percent,
    /// emits the terminal signal and returns to `Idle` on every path.
    fn run<T>(
        &self,
        operation: Operation,
        describe: impl FnOnce(&T) -> String,
        body: impl FnOnce(&StateGuard<'_>) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let guard = match StateGuard::enter(&self.state, operation) {
            Ok(guard) => guard,
            Err(e) => {
                self.progress.on_error(operation, &e);
                return Err(e);
            }
        };
        let start = Instant::now();
        self.report(operation, 0);
        let result = body(&guard);
        drop(guard);

        match &result {
            Ok(value) => {
                let message = describe(value);
                let mut stats = self.stats.write();
                stats.operations_completed += 1;
                stats.last_success_time = Some(Instant::now());
                drop(stats);
                self.report(operation, 100);
                info!(%operation, elapsed_ms = start.elapsed().as_millis() as u64, "{message}");
                self.progress.on_success(operation, &message);
            }
            Err(e) => {
                let mut stats = self.stats.write();
                stats.operations_failed += 1;
                stats.last_error = Some(e.to_string());
                drop(stats);
                warn!(%operation, error = %e, "operation failed");
                self.progress.on_error(operation, e);
            }
        }
        result
    }
}

fn describe_commit(outcome: &CommitOutcome) -> String {
    format!(
        "version {} registered ({} uploaded, {} deleted)",
        outcome.version,
        outcome.uploaded.len(),
        outcome.deleted.len()
    )
}

fn entity_key(reference: EntityRef) -> EntityKey {
    EntityKey::new(EntityId(reference.id), Version(reference.version))
}

/// Copies `from` to `to`, creating parent folders and keeping the
/// modification time.
fn copy_preserving(from: &Path, to: &Path) -> SyncResult<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::filesystem(parent, e))?;
    }
    fs::copy(from, to).map_err(|e| SyncError::filesystem(from, e))?;
    let modified = fs::metadata(from)
        .and_then(|meta| meta.modified())
        .map_err(|e| SyncError::filesystem(from, e))?;
    File::options()
        .write(true)
        .open(to)
        .and_then(|file| file.set_modified(modified))
        .map_err(|e| SyncError::filesystem(to, e))
}

fn discard_partial(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "could not remove partial cache folder");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResultLayout;
    use crate::progress::ProgressLog;
    use crate::transport::MockService;
    use std::time::{Duration, SystemTime};
    use strata_core::StoreConfig;
    use strata_storage::InMemoryBackend;
    use strata_sync_protocol::{CommitResponse, IdGrant, VersionFiles};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        backend: Arc<InMemoryBackend>,
        progress: Arc<ProgressLog>,
        engine: SyncEngine<MockService>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let backend = Arc::new(InMemoryBackend::new());
            let store = Arc::new(EntityStore::new(backend.clone(), StoreConfig::default()));
            let progress = Arc::new(ProgressLog::new());
            let engine = SyncEngine::new(
                SyncConfig::new("memory://").with_results(ResultLayout::default()),
                store,
                MockService::new(),
            )
            .with_progress(progress.clone());
            Self {
                dir,
                backend,
                progress,
                engine,
            }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("foo.main")
        }

        fn write(&self, relative: &str, bytes: &[u8], secs: u64) {
            let path = self.dir.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, bytes).unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
                .unwrap();
        }

        fn grant(&self, files: u64) {
            let ids = (0..2 * files).map(|i| 100 + i).collect();
            let versions = (0..2 * files).map(|i| 200 + i).collect();
            self.engine.service().set_grant(IdGrant::new(ids, versions));
        }
    }

    #[test]
    fn import_uploads_every_file_and_caches_version() {
        let fx = Fixture::new();
        fx.write("foo.main", b"root", 10);
        fx.write("foo/Result/a.txt", b"alpha", 10);
        fx.grant(2);
        fx.engine
            .service()
            .set_commit_response(CommitResponse::success("1"));

        let outcome = fx
            .engine
            .import_project(&fx.root(), "Foo", "initial", true)
            .unwrap();
        assert_eq!(outcome.version, "1");
        assert_eq!(outcome.uploaded.len(), 2);
        assert_eq!(fx.backend.document_count("Foo"), 4);
        assert_eq!(fx.backend.stats().insert_batches, 1);

        let commit = fx.engine.service().last_commit().unwrap();
        assert_eq!(commit.files[0].logical_path, "Files/foo.main");
        assert_eq!(commit.files[0].data, EntityRef::new(100, 200));
        assert_eq!(commit.files[0].file, EntityRef::new(101, 201));
        assert_eq!(commit.files[1].data, EntityRef::new(102, 202));

        assert!(fx.dir.path().join("foo.cache/1/foo/Result/a.txt").is_file());
        assert_eq!(fx.engine.current_version(&fx.root(), "Foo").unwrap(), "1");
        assert_eq!(fx.engine.state(), SyncState::Idle);

        let percentages = fx.progress.percentages(Operation::Import);
        assert_eq!(percentages.first(), Some(&0));
        assert!(percentages.contains(&15));
        assert!(percentages.contains(&90));
        assert_eq!(percentages.last(), Some(&100));
    }

    #[test]
    fn import_over_existing_cache_fails() {
        let fx = Fixture::new();
        fx.write("foo.main", b"root", 10);
        fs::create_dir_all(fx.dir.path().join("foo.cache")).unwrap();

        let err = fx
            .engine
            .import_project(&fx.root(), "Foo", "again", true)
            .unwrap_err();
        assert!(matches!(err, SyncError::CacheAlreadyExists { .. }));
        assert_eq!(fx.engine.service().calls(), 0);
        assert_eq!(fx.engine.state(), SyncState::Idle);
        assert!(matches!(
            fx.progress.events().last(),
            Some(crate::progress::ProgressEvent::Error(Operation::Import, _))
        ));
    }

    #[test]
    fn short_grant_is_protocol_error() {
        let fx = Fixture::new();
        fx.write("foo.main", b"root", 10);
        fx.engine
            .service()
            .set_grant(IdGrant::new(vec![100], vec![200]));

        let err = fx
            .engine
            .import_project(&fx.root(), "Foo", "initial", false)
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert_eq!(fx.engine.stats().operations_failed, 1);
        assert!(!fx.dir.path().join("foo.cache").exists());
    }

    #[test]
    fn failed_import_can_be_retried() {
        let fx = Fixture::new();
        fx.write("foo.main", b"root", 10);
        fx.grant(1);
        fx.engine
            .service()
            .set_commit_response(CommitResponse::error("project locked"));
        assert!(fx
            .engine
            .import_project(&fx.root(), "Foo", "initial", false)
            .is_err());
        assert!(!fx.dir.path().join("foo.cache").exists());

        fx.engine
            .service()
            .set_commit_response(CommitResponse::success("1"));
        let outcome = fx
            .engine
            .import_project(&fx.root(), "Foo", "initial", false)
            .unwrap();
        assert_eq!(outcome.version, "1");
        assert_eq!(fx.engine.current_version(&fx.root(), "Foo").unwrap(), "1");
    }

    #[test]
    fn server_version_label_must_name_a_cache_folder() {
        let fx = Fixture::new();
        fx.write("foo.main", b"root", 10);
        fx.grant(1);
        fx.engine
            .service()
            .set_commit_response(CommitResponse::success("../x"));

        let err = fx
            .engine
            .import_project(&fx.root(), "Foo", "initial", false)
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(!fx.dir.path().join("x").exists());
        assert!(!fx.dir.path().join("foo.cache").exists());
        assert_eq!(fs::read(fx.root()).unwrap(), b"root");
    }

    #[test]
    fn rejected_commit_is_server_error() {
        let fx = Fixture::new();
        fx.write("foo.main", b"root", 10);
        fx.grant(1);
        fx.engine
            .service()
            .set_commit_response(CommitResponse::error("project locked"));

        let err = fx
            .engine
            .import_project(&fx.root(), "Foo", "initial", false)
            .unwrap_err();
        assert!(matches!(err, SyncError::ServerError(ref m) if m == "project locked"));
        assert!(!fx.engine.store().is_queue_writing());
    }

    #[test]
    fn validation_rules() {
        let fx = Fixture::new();
        let no_extension = fx.dir.path().join("foo");
        assert!(matches!(
            fx.engine.check_valid_local_file(&no_extension, "Foo", false),
            Err(SyncError::InvalidPath { .. })
        ));
        assert!(matches!(
            fx.engine.check_valid_local_file(&fx.root(), "Foo", true),
            Err(SyncError::ProjectMissing { .. })
        ));
        assert!(fx.engine.check_valid_local_file(&fx.root(), "Foo", false).is_ok());

        fs::create_dir_all(fx.dir.path().join("foo.cache")).unwrap();
        assert!(matches!(
            fx.engine.check_valid_local_file(&fx.root(), "Foo", false),
            Err(SyncError::CacheConsistency { .. })
        ));

        fs::remove_dir_all(fx.dir.path().join("foo.cache")).unwrap();
        fx.write("foo.main", b"root", 10);
        assert!(matches!(
            fx.engine.check_valid_local_file(&fx.root(), "Foo", true),
            Err(SyncError::NotUnderVersionControl { .. })
        ));

        fs::create_dir_all(fx.dir.path().join("foo.cache")).unwrap();
        VersionManifest::new("foo", "Bar", "1")
            .save(&fx.dir.path().join("foo.cache/version.info"))
            .unwrap();
        assert!(matches!(
            fx.engine.check_valid_local_file(&fx.root(), "Foo", true),
            Err(SyncError::CacheConsistency { .. })
        ));
        assert!(matches!(
            fx.engine.open_project(&fx.root(), "Foo"),
            Err(SyncError::CacheConsistency { .. })
        ));
        assert_eq!(fx.engine.open_project(&fx.root(), "Bar").unwrap().version, "1");
    }

    #[test]
    fn get_rejects_labels_outside_the_cache() {
        let fx = Fixture::new();
        fx.write("foo.main", b"v1 root", 10);
        fx.write("foo/Result/a.txt", b"v1 result", 10);
        fx.write("foo.cache/1/foo.main", b"v1 root", 10);
        let manifest_path = fx.dir.path().join("foo.cache/version.info");
        VersionManifest::new("foo", "Foo", "1")
            .save(&manifest_path)
            .unwrap();
        let manifest = fs::read(&manifest_path).unwrap();

        for label in ["", ".", "..", "../x"] {
            let err = fx.engine.get_project(&fx.root(), "Foo", label).unwrap_err();
            assert!(matches!(err, SyncError::InvalidPath { .. }), "{label:?}");
            assert_eq!(fx.engine.state(), SyncState::Idle);
        }
        assert_eq!(fs::read(fx.root()).unwrap(), b"v1 root");
        assert_eq!(fs::read(fx.dir.path().join("foo/Result/a.txt")).unwrap(), b"v1 result");
        assert_eq!(fs::read(&manifest_path).unwrap(), manifest);
        assert!(fx.dir.path().join("foo.cache/1/foo.main").is_file());
        assert_eq!(fx.engine.service().calls(), 0);
    }

    #[test]
    fn manifest_with_invalid_label_is_inconsistent() {
        let fx = Fixture::new();
        fx.write("foo.main", b"root", 10);
        fs::create_dir_all(fx.dir.path().join("foo.cache")).unwrap();
        VersionManifest::new("foo", "Foo", "..")
            .save(&fx.dir.path().join("foo.cache/version.info"))
            .unwrap();
        assert!(matches!(
            fx.engine.current_version(&fx.root(), "Foo"),
            Err(SyncError::CacheConsistency { .. })
        ));
    }

    #[test]
    fn get_from_cache_needs_no_service() {
        let fx = Fixture::new();
        fx.write("foo.main", b"v2 root", 20);
        fx.write("foo.cache/1/foo.main", b"v1 root", 10);
        fx.write("foo.cache/1/foo/Result/a.txt", b"v1 result", 10);
        VersionManifest::new("foo", "Foo", "2")
            .save(&fx.dir.path().join("foo.cache/version.info"))
            .unwrap();

        let outcome = fx.engine.get_project(&fx.root(), "Foo", "1").unwrap();
        assert!(outcome.from_cache);
        assert_eq!(outcome.files, 2);
        assert_eq!(fx.engine.service().calls(), 0);
        assert_eq!(fs::read(fx.root()).unwrap(), b"v1 root");
        assert_eq!(fx.engine.current_version(&fx.root(), "Foo").unwrap(), "1");
        assert_eq!(fx.engine.stats().cache_hits, 1);

        let percentages = fx.progress.percentages(Operation::Get);
        assert_eq!(percentages, vec![0, 10, 90, 100]);
    }

    #[test]
    fn failed_download_leaves_no_partial_snapshot() {
        let fx = Fixture::new();
        fx.engine.service().set_version_files(VersionFiles::success(vec![FileRecord::new(
            "Files/foo.main",
            EntityRef::new(7, 8),
            EntityRef::new(9, 10),
        )]));

        let err = fx.engine.get_project(&fx.root(), "Foo", "3").unwrap_err();
        assert!(matches!(err, SyncError::RestoreFailed { ref version, .. } if version == "3"));
        assert!(!fx.dir.path().join("foo.cache/3").exists());
        assert_eq!(fx.engine.state(), SyncState::Idle);
    }
}
