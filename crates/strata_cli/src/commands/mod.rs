//! CLI command implementations.

pub mod hash;
pub mod status;
pub mod transfer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::{CoreError, EntityStore, StoreConfig};
use strata_storage::{DocumentBackend, FileBackend, StorageError};
use strata_sync_engine::{
    HttpTransport, LoopbackClient, ResultLayout, SyncConfig, SyncEngine, SyncError,
};
use strata_sync_server::{ModelServer, ServerConfig, ServerError};
use thiserror::Error;
use tracing::debug;

/// Folder of the document backend inside a repository.
pub const DOCUMENTS_DIR: &str = "documents";

/// Version registry file inside a repository.
pub const REGISTRY_FILE: &str = "registry.json";

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad command-line input.
    #[error("{0}")]
    Usage(String),

    /// Repository storage failure.
    #[error("repository error: {0}")]
    Storage(#[from] StorageError),

    /// Model service failure.
    #[error("model service error: {0}")]
    Server(#[from] ServerError),

    /// Store failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Sync operation failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// File I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON output failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Output format of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses `text` or `json`.
    pub fn parse(name: &str) -> CliResult<Self> {
        match name {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(CliError::Usage(format!(
                "unknown output format '{other}' (expected text or json)"
            ))),
        }
    }

    /// Prints `value` as JSON, or `text` otherwise.
    pub fn print<T: serde::Serialize>(self, value: &T, text: impl FnOnce(&T)) -> CliResult<()> {
        match self {
            Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Format::Text => text(value),
        }
        Ok(())
    }
}

/// Engine type used by the CLI.
pub type RepoEngine = SyncEngine<HttpTransport<LoopbackClient<Arc<ModelServer>>>>;

/// A repository directory: a file document backend plus the version
/// registry of an in-process model service.
pub struct Repository {
    root: PathBuf,
    engine: RepoEngine,
}

impl Repository {
    /// Opens or creates the repository at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is locked by another process or the
    /// registry cannot be read.
    pub fn open(root: &Path, results: ResultLayout) -> CliResult<Self> {
        let backend: Arc<dyn DocumentBackend> =
            Arc::new(FileBackend::open(&root.join(DOCUMENTS_DIR))?);
        let server = Arc::new(ModelServer::with_backend(
            ServerConfig::default().with_registry_path(root.join(REGISTRY_FILE)),
            Arc::clone(&backend),
        )?);

        let url = format!("file://{}", root.display());
        let store = Arc::new(EntityStore::new(backend, StoreConfig::default()));
        let transport = HttpTransport::new(url.clone(), LoopbackClient::new(server));
        let engine = SyncEngine::new(SyncConfig::new(url).with_results(results), store, transport);
        debug!(repository = %root.display(), "opened repository");

        Ok(Self {
            root: root.to_path_buf(),
            engine,
        })
    }

    /// The repository directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The sync engine bound to this repository.
    pub fn engine(&self) -> &RepoEngine {
        &self.engine
    }
}
