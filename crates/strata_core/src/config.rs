//! Entity store configuration.

/// Default payload volume that triggers an automatic queue flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 100_000_000;

/// Default size from which documents are written as out-of-line storage.
pub const DEFAULT_MAX_INLINE_DOCUMENT: usize = 16 * 1024 * 1024;

/// Configuration for an [`crate::EntityStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Accumulated queued bytes that force a flush while queueing stays on.
    pub flush_threshold: usize,

    /// Encoded documents at or above this size are tagged
    /// `InsertType::FileStorage` and never prefetched.
    pub max_inline_document_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_inline_document_size: DEFAULT_MAX_INLINE_DOCUMENT,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the automatic flush threshold in bytes.
    #[must_use]
    pub const fn flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    /// Sets the largest inline document size in bytes.
    #[must_use]
    pub const fn max_inline_document_size(mut self, bytes: usize) -> Self {
        self.max_inline_document_size = bytes;
        self
    }
}
