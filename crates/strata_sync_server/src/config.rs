//! Server configuration.

use std::path::PathBuf;

/// Configuration for the model service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// First value of the internal id counter. Ignored when ids come from
    /// a document backend.
    pub first_id: u64,
    /// Prefix of version labels (`""` gives `1`, `2`, ...).
    pub label_prefix: String,
    /// Maximum files per id request.
    pub max_id_batch: u32,
    /// File the version registry is persisted to, if any.
    pub registry_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            first_id: 2,
            label_prefix: String::new(),
            max_id_batch: 100_000,
            registry_path: None,
        }
    }

    /// Sets the first id of the internal counter. Values below 2 are
    /// raised to 2, since `0` and `1` are reserved.
    #[must_use]
    pub fn with_first_id(mut self, first_id: u64) -> Self {
        self.first_id = first_id.max(2);
        self
    }

    /// Sets the version label prefix.
    #[must_use]
    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    /// Sets the maximum id batch.
    #[must_use]
    pub fn with_max_id_batch(mut self, max: u32) -> Self {
        self.max_id_batch = max;
        self
    }

    /// Persists the registry to `path`.
    #[must_use]
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// Label of the `n`-th version (1-based).
    pub fn label(&self, n: usize) -> String {
        format!("{}{n}", self.label_prefix)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_first_id(1)
            .with_label_prefix("v")
            .with_max_id_batch(10);

        assert_eq!(config.first_id, 2);
        assert_eq!(config.max_id_batch, 10);
        assert_eq!(config.label(3), "v3");
        assert!(config.registry_path.is_none());
    }

    #[test]
    fn default_labels_are_plain_numbers() {
        assert_eq!(ServerConfig::default().label(1), "1");
    }
}
