//! Correlation registry: task id → pending caller continuation.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::warn;

use crate::domain::{ExecOutcome, TaskId};
use crate::error::SpindleError;

pub(crate) type Continuation = oneshot::Sender<Result<ExecOutcome, SpindleError>>;

/// Pure bookkeeping. Entries are inserted at submission and removed exactly
/// once, at completion, regardless of completion arrival order.
///
/// Completing an unknown (or already completed) id is a protocol error:
/// logged and ignored, never fatal to the dispatcher.
#[derive(Default)]
pub(crate) struct CorrelationRegistry {
    pending: HashMap<TaskId, Continuation>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Register a continuation. A duplicate id fails the new entry loudly
    /// and leaves the pending one untouched.
    pub fn register(&mut self, id: TaskId, continuation: Continuation) -> Result<(), Continuation> {
        if self.pending.contains_key(&id) {
            return Err(continuation);
        }
        self.pending.insert(id, continuation);
        Ok(())
    }

    pub fn resolve(&mut self, id: TaskId, outcome: ExecOutcome) {
        self.finish(id, Ok(outcome));
    }

    pub fn reject(&mut self, id: TaskId, error: SpindleError) {
        self.finish(id, Err(error));
    }

    fn finish(&mut self, id: TaskId, result: Result<ExecOutcome, SpindleError>) {
        match self.pending.remove(&id) {
            // A send failure just means the caller stopped waiting.
            Some(continuation) => {
                let _ = continuation.send(result);
            }
            None => warn!(task_id = %id, "completion for unknown task id (duplicate or stale)"),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
