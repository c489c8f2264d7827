//! Worker-thread dispatch of the blocking engine operations.

use crate::engine::{CommitOutcome, GetOutcome, ProjectStatus, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::transport::ProjectService;
use std::path::PathBuf;
use std::sync::Arc;

/// Runs [`SyncEngine`] operations on tokio's blocking thread pool.
///
/// Progress and completion signals still arrive through the engine's
/// [`ProgressSink`](crate::ProgressSink), on the worker thread.
pub struct AsyncSyncEngine<S: ProjectService> {
    engine: Arc<SyncEngine<S>>,
}

impl<S: ProjectService> Clone for AsyncSyncEngine<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: ProjectService + 'static> AsyncSyncEngine<S> {
    /// Wraps an engine.
    pub fn new(engine: SyncEngine<S>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    async fn dispatch<T, F>(&self, work: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SyncEngine<S>) -> SyncResult<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || work(&engine))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?
    }

    /// See [`SyncEngine::open_project`].
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or [`SyncError::Worker`] if the
    /// worker panicked.
    pub async fn open_project(&self, file: PathBuf, project: String) -> SyncResult<ProjectStatus> {
        self.dispatch(move |engine| engine.open_project(&file, &project))
            .await
    }

    /// See [`SyncEngine::import_project`].
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or [`SyncError::Worker`] if the
    /// worker panicked.
    pub async fn import_project(
        &self,
        file: PathBuf,
        project: String,
        message: String,
        include_results: bool,
    ) -> SyncResult<CommitOutcome> {
        self.dispatch(move |engine| {
            engine.import_project(&file, &project, &message, include_results)
        })
        .await
    }

    /// See [`SyncEngine::commit_project`].
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or [`SyncError::Worker`] if the
    /// worker panicked.
    pub async fn commit_project(
        &self,
        file: PathBuf,
        project: String,
        comment: String,
        include_results: bool,
    ) -> SyncResult<CommitOutcome> {
        self.dispatch(move |engine| {
            engine.commit_project(&file, &project, &comment, include_results)
        })
        .await
    }

    /// See [`SyncEngine::get_project`].
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or [`SyncError::Worker`] if the
    /// worker panicked.
    pub async fn get_project(
        &self,
        file: PathBuf,
        project: String,
        version: String,
    ) -> SyncResult<GetOutcome> {
        self.dispatch(move |engine| engine.get_project(&file, &project, &version))
            .await
    }
}
