//! Test fixtures: project trees, stores and loopback engines.
//!
//! Provides convenience functions for setting up project working trees
//! on disk and sync engines wired to an in-process model server.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use strata_core::{EntityStore, StoreConfig};
use strata_storage::{DocumentBackend, FileBackend, InMemoryBackend};
use strata_sync_engine::{
    HttpTransport, LoopbackClient, ProgressLog, SyncConfig, SyncEngine,
};
use strata_sync_server::{ModelServer, ServerConfig};
use tempfile::TempDir;

/// Url handed to the store and transport of loopback engines.
pub const LOOPBACK_URL: &str = "loopback://model";

/// Transport of a loopback engine.
pub type LoopbackTransport = HttpTransport<LoopbackClient<Arc<ModelServer>>>;

/// A sync engine talking to an in-process [`ModelServer`].
pub type LoopbackEngine = SyncEngine<LoopbackTransport>;

/// A project working tree in a temporary directory.
pub struct TestProject {
    root_file: PathBuf,
    _temp_dir: TempDir,
}

impl TestProject {
    /// Creates an empty directory that will hold `<base_name>.main`.
    ///
    /// The root file itself is not written.
    pub fn empty(base_name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_file = temp_dir.path().join(format!("{base_name}.main"));
        Self {
            root_file,
            _temp_dir: temp_dir,
        }
    }

    /// Creates a project with only a root document.
    pub fn new(base_name: &str) -> Self {
        let project = Self::empty(base_name);
        project.write(
            &format!("{base_name}.main"),
            format!("root document of {base_name}").as_bytes(),
        );
        project
    }

    /// The root document path.
    pub fn root_file(&self) -> &Path {
        &self.root_file
    }

    /// The project directory.
    pub fn dir(&self) -> &Path {
        self.root_file
            .parent()
            .expect("root file always has a parent directory")
    }

    /// Absolute path of `relative`.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir().join(relative)
    }

    /// Writes `relative`, creating parent directories.
    pub fn write(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, bytes).expect("Failed to write project file");
        path
    }

    /// Writes `relative` and sets its modification time.
    pub fn write_with_mtime(&self, relative: &str, bytes: &[u8], mtime: SystemTime) -> PathBuf {
        let path = self.write(relative, bytes);
        self.set_mtime(relative, mtime);
        path
    }

    /// Sets the modification time of `relative`.
    pub fn set_mtime(&self, relative: &str, mtime: SystemTime) {
        let file = File::options()
            .write(true)
            .open(self.path(relative))
            .expect("Failed to open project file");
        file.set_modified(mtime)
            .expect("Failed to set modification time");
    }

    /// Modification time of `relative`.
    pub fn mtime(&self, relative: &str) -> SystemTime {
        fs::metadata(self.path(relative))
            .and_then(|m| m.modified())
            .expect("Failed to read modification time")
    }

    /// Moves the modification time of `relative` forward without changing
    /// its bytes.
    pub fn touch(&self, relative: &str) {
        let later = self.mtime(relative) + Duration::from_secs(10);
        self.set_mtime(relative, later);
    }

    /// Reads `relative`.
    pub fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.path(relative)).expect("Failed to read project file")
    }

    /// Removes `relative`.
    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).expect("Failed to remove project file");
    }

    /// Returns true if `relative` exists.
    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// The cache folder of this project.
    pub fn cache_dir(&self) -> PathBuf {
        self.root_file.with_extension("cache")
    }
}

/// An entity store over an in-memory backend, with the backend exposed
/// for inspection.
pub fn memory_store() -> (Arc<InMemoryBackend>, Arc<EntityStore>) {
    memory_store_with(StoreConfig::default())
}

/// Like [`memory_store`] with a custom store configuration.
pub fn memory_store_with(config: StoreConfig) -> (Arc<InMemoryBackend>, Arc<EntityStore>) {
    let backend = Arc::new(InMemoryBackend::new());
    let store = Arc::new(EntityStore::new(backend.clone(), config));
    (backend, store)
}

/// An entity store over a file backend rooted in `dir`.
pub fn file_store(dir: &Path) -> Arc<EntityStore> {
    let backend = FileBackend::open(dir).expect("Failed to open file backend");
    Arc::new(EntityStore::new(Arc::new(backend), StoreConfig::default()))
}

/// Everything a loopback sync test needs.
pub struct SyncFixture {
    /// The engine under test.
    pub engine: LoopbackEngine,
    /// The model server behind the engine.
    pub server: Arc<ModelServer>,
    /// The document backend shared by store and server.
    pub backend: Arc<InMemoryBackend>,
    /// Recorded progress and completion signals.
    pub progress: Arc<ProgressLog>,
}

impl SyncFixture {
    /// Engine, server and store over a fresh in-memory backend.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::new(LOOPBACK_URL), StoreConfig::default())
    }

    /// Like [`new`](Self::new) with custom configurations.
    pub fn with_config(config: SyncConfig, store_config: StoreConfig) -> Self {
        let (backend, store) = memory_store_with(store_config);
        let shared: Arc<dyn DocumentBackend> = backend.clone();
        let server = Arc::new(
            ModelServer::with_backend(ServerConfig::default(), shared)
                .expect("Failed to create model server"),
        );
        let engine = loopback_engine(config, store, Arc::clone(&server));
        let progress = Arc::new(ProgressLog::new());
        let engine = engine.with_progress(progress.clone());
        Self {
            engine,
            server,
            backend,
            progress,
        }
    }

    /// A second engine (another client) over the same backend and server.
    pub fn second_client(&self) -> LoopbackEngine {
        let store = Arc::new(EntityStore::new(
            self.backend.clone(),
            StoreConfig::default(),
        ));
        loopback_engine(
            SyncConfig::new(LOOPBACK_URL),
            store,
            Arc::clone(&self.server),
        )
    }
}

impl Default for SyncFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A sync engine routed to `server` in-process.
pub fn loopback_engine(
    config: SyncConfig,
    store: Arc<EntityStore>,
    server: Arc<ModelServer>,
) -> LoopbackEngine {
    let transport = HttpTransport::new(LOOPBACK_URL, LoopbackClient::new(server));
    SyncEngine::new(config, store, transport)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Root document of [`foo_project`].
    pub const FOO_ROOT: &str = "foo.main";
    /// First result file of [`foo_project`].
    pub const FOO_RESULT_A: &str = "foo/Result/a.txt";
    /// Second result file of [`foo_project`].
    pub const FOO_RESULT_B: &str = "foo/Result/b.txt";
    /// Size of [`FOO_RESULT_A`] in bytes.
    pub const FOO_RESULT_A_SIZE: usize = 100;
    /// Size of [`FOO_RESULT_B`] in bytes.
    pub const FOO_RESULT_B_SIZE: usize = 50;

    /// `len` bytes cycling through the printable ASCII range from `first`.
    pub fn filled(first: u8, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| b' ' + ((usize::from(first.saturating_sub(b' ')) + i) % 95) as u8)
            .collect()
    }

    /// The `foo` project: a root document, a 100 byte `a.txt` and a
    /// 50 byte `b.txt`.
    pub fn foo_project() -> TestProject {
        let project = TestProject::empty("foo");
        project.write(FOO_ROOT, b"foo root document");
        project.write(FOO_RESULT_A, &filled(b'a', FOO_RESULT_A_SIZE));
        project.write(FOO_RESULT_B, &filled(b'b', FOO_RESULT_B_SIZE));
        project
    }

    /// A project with `count` result files of `size` bytes each.
    pub fn project_with_results(base_name: &str, count: usize, size: usize) -> TestProject {
        let project = TestProject::new(base_name);
        for i in 0..count {
            let bytes: Vec<u8> = (0..size).map(|j| ((i + j) % 251) as u8).collect();
            project.write(&format!("{base_name}/Result/r{i:03}.bin"), &bytes);
        }
        project
    }
}

#[cfg(test)]
mod tests {
    use super::scenarios::*;
    use super::*;

    #[test]
    fn foo_scenario_layout() {
        let project = foo_project();
        assert!(project.root_file().is_file());
        assert!(project.exists(FOO_RESULT_A));
        assert!(project.exists(FOO_RESULT_B));
        assert_eq!(project.read(FOO_RESULT_A).len(), FOO_RESULT_A_SIZE);
        assert_eq!(project.read(FOO_RESULT_B).len(), FOO_RESULT_B_SIZE);
        assert!(!project.cache_dir().exists());
    }

    #[test]
    fn touch_keeps_bytes() {
        let project = foo_project();
        let before = project.mtime(FOO_RESULT_A);
        project.touch(FOO_RESULT_A);
        assert!(project.mtime(FOO_RESULT_A) > before);
        assert_eq!(project.read(FOO_RESULT_A), filled(b'a', FOO_RESULT_A_SIZE));
    }

    #[test]
    fn filled_bytes_differ_by_start() {
        let a = filled(b'a', FOO_RESULT_A_SIZE);
        let upper = filled(b'A', FOO_RESULT_A_SIZE);
        assert_eq!(a.len(), upper.len());
        assert_ne!(a, upper);
        assert!(a.iter().all(|b| (b' '..=b'~').contains(b)));
    }

    #[test]
    fn empty_project_has_no_root() {
        let project = TestProject::empty("bar");
        assert!(!project.root_file().exists());
        assert!(project.dir().is_dir());
    }

    #[test]
    fn fixture_is_idle() {
        let fixture = SyncFixture::new();
        assert_eq!(fixture.server.project_count(), 0);
        assert!(fixture.progress.events().is_empty());
    }
}
