//! Progress and completion signals of engine operations.

use crate::error::SyncError;
use crate::state::Operation;
use parking_lot::Mutex;

/// Receives percentage milestones and the terminal signal of every
/// operation.
pub trait ProgressSink: Send + Sync {
    /// Reports `percent` (0 to 100) for `operation`.
    fn on_progress(&self, operation: Operation, percent: u8);

    /// The operation finished successfully.
    fn on_success(&self, operation: Operation, message: &str);

    /// The operation failed.
    fn on_error(&self, operation: Operation, error: &SyncError);
}

/// Ignores every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_progress(&self, _operation: Operation, _percent: u8) {}
    fn on_success(&self, _operation: Operation, _message: &str) {}
    fn on_error(&self, _operation: Operation, _error: &SyncError) {}
}

/// A recorded signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Percentage milestone.
    Progress(Operation, u8),
    /// Success with message.
    Success(Operation, String),
    /// Failure with the error's display text.
    Error(Operation, String),
}

/// Records every signal in order.
#[derive(Debug, Default)]
pub struct ProgressLog {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Recorded percentages of `operation`.
    pub fn percentages(&self, operation: Operation) -> Vec<u8> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress(op, percent) if *op == operation => Some(*percent),
                _ => None,
            })
            .collect()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ProgressSink for ProgressLog {
    fn on_progress(&self, operation: Operation, percent: u8) {
        self.events
            .lock()
            .push(ProgressEvent::Progress(operation, percent));
    }

    fn on_success(&self, operation: Operation, message: &str) {
        self.events
            .lock()
            .push(ProgressEvent::Success(operation, message.to_string()));
    }

    fn on_error(&self, operation: Operation, error: &SyncError) {
        self.events
            .lock()
            .push(ProgressEvent::Error(operation, error.to_string()));
    }
}
