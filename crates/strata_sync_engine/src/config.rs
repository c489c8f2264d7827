//! Configuration for the sync engine.

use strata_core::StoreConfig;
use uuid::Uuid;

/// Name of the default result folder.
pub const DEFAULT_RESULT_FOLDER: &str = "Result";

/// Which files besides the root document belong to a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLayout {
    /// Files next to the root document named `<stem>.*`.
    Siblings,
    /// Every file below `<base>/<name>`.
    Folder(String),
}

impl Default for ResultLayout {
    fn default() -> Self {
        ResultLayout::Folder(DEFAULT_RESULT_FOLDER.to_string())
    }
}

/// Percentages reported at workflow milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestones {
    /// Upload set determined.
    pub planned: u8,
    /// Upload finished.
    pub uploaded: u8,
    /// Local working files deleted.
    pub cleared: u8,
    /// Download started.
    pub download_start: u8,
    /// Download finished, or version restored from the cache.
    pub restored: u8,
}

impl Default for Milestones {
    fn default() -> Self {
        Self {
            planned: 15,
            uploaded: 90,
            cleared: 10,
            download_start: 20,
            restored: 90,
        }
    }
}

impl Milestones {
    /// Linear interpolation between two milestones for step `i` of `n`.
    pub fn between(start: u8, end: u8, i: usize, n: usize) -> u8 {
        if n == 0 {
            return start;
        }
        let span = usize::from(end.saturating_sub(start));
        let step = span * i.min(n) / n;
        start.saturating_add(u8::try_from(step).unwrap_or(u8::MAX))
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Client ID (unique per engine instance).
    pub client_id: Uuid,
    /// Document store URL.
    pub server_url: String,
    /// Collection name; `None` scopes the collection to the project name.
    pub collection: Option<String>,
    /// Result file layout.
    pub results: ResultLayout,
    /// Entity store configuration.
    pub store: StoreConfig,
    /// Progress milestones.
    pub milestones: Milestones,
}

impl SyncConfig {
    /// Creates a new sync configuration with a random client id.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            server_url: server_url.into(),
            collection: None,
            results: ResultLayout::default(),
            store: StoreConfig::default(),
            milestones: Milestones::default(),
        }
    }

    /// Sets the client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: Uuid) -> Self {
        self.client_id = client_id;
        self
    }

    /// Uses one fixed collection for every project.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the result layout.
    #[must_use]
    pub fn with_results(mut self, results: ResultLayout) -> Self {
        self.results = results;
        self
    }

    /// Sets the entity store configuration.
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Sets the progress milestones.
    #[must_use]
    pub fn with_milestones(mut self, milestones: Milestones) -> Self {
        self.milestones = milestones;
        self
    }

    /// Collection used for `project`.
    pub fn collection_for(&self, project: &str) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| project.to_string())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let id = Uuid::new_v4();
        let config = SyncConfig::new("file:///srv/models")
            .with_client_id(id)
            .with_collection("shared")
            .with_results(ResultLayout::Siblings);

        assert_eq!(config.client_id, id);
        assert_eq!(config.server_url, "file:///srv/models");
        assert_eq!(config.collection_for("foo"), "shared");
        assert_eq!(config.results, ResultLayout::Siblings);
    }

    #[test]
    fn collection_defaults_to_project() {
        let config = SyncConfig::default();
        assert_eq!(config.collection_for("foo"), "foo");
        assert_eq!(config.results, ResultLayout::Folder("Result".into()));
    }

    #[test]
    fn client_ids_are_unique() {
        assert_ne!(SyncConfig::default().client_id, SyncConfig::default().client_id);
    }

    #[test]
    fn upload_progress_spans_milestones() {
        assert_eq!(Milestones::between(15, 90, 0, 4), 15);
        assert_eq!(Milestones::between(15, 90, 2, 4), 52);
        assert_eq!(Milestones::between(15, 90, 4, 4), 90);
        assert_eq!(Milestones::between(20, 90, 0, 0), 20);
    }
}
