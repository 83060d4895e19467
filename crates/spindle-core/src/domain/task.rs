//! Task - one unit of requested data-store work.

use std::time::Instant;

use serde_json::Value;

use super::{Statement, TaskId};

/// Everything the dispatcher needs to carry a submitted statement to a
/// worker. Immutable after creation; the "assigned worker" tag lives in the
/// slot, not here.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub statement: Statement,
    pub params: Vec<Value>,
    pub enqueued_at: Instant,
}

impl Task {
    pub fn new(id: TaskId, statement: Statement, params: Vec<Value>) -> Self {
        Self {
            id,
            statement,
            params,
            enqueued_at: Instant::now(),
        }
    }
}
