//! Write batching for the entity store.

use strata_storage::StoredDocument;

/// Buffers document writes so they reach the backend as one batch.
///
/// The queue only holds documents; the owning store decides where a drained
/// batch goes. A document with the same key as a pending one replaces it.
#[derive(Debug)]
pub struct WriteQueue {
    enabled: bool,
    pending: Vec<StoredDocument>,
    pending_bytes: usize,
    threshold: usize,
}

impl WriteQueue {
    /// Creates a disabled queue that asks for a flush once `threshold`
    /// payload bytes are pending.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            enabled: false,
            pending: Vec::new(),
            pending_bytes: 0,
            threshold,
        }
    }

    /// Returns true while writes are being queued.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns queueing on or off.
    ///
    /// Returns true when the queue went from on to off, meaning pending
    /// documents must be flushed now.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let was_enabled = std::mem::replace(&mut self.enabled, enabled);
        was_enabled && !enabled
    }

    /// Adds a document.
    ///
    /// Returns true when the pending volume reached the threshold.
    pub fn push(&mut self, document: StoredDocument) -> bool {
        let size = document.body.len();
        if let Some(slot) = self.pending.iter_mut().find(|d| d.key == document.key) {
            self.pending_bytes -= slot.body.len();
            *slot = document;
        } else {
            self.pending.push(document);
        }
        self.pending_bytes += size;
        self.pending_bytes >= self.threshold
    }

    /// Drains all pending documents in insertion order.
    pub fn take(&mut self) -> Vec<StoredDocument> {
        self.pending_bytes = 0;
        std::mem::take(&mut self.pending)
    }

    /// Number of pending documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending payload bytes.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }
}
