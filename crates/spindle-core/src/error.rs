use thiserror::Error;

use crate::domain::TaskId;

/// Errors surfaced to callers of the pool.
///
/// Statement failures are fatal to the task only, never to the pool; the
/// protocol variants are logged by the dispatcher, which keeps running.
#[derive(Debug, Error)]
pub enum SpindleError {
    /// The store rejected the statement (constraint violation, malformed
    /// SQL, bind failure). Carries the native error description.
    #[error("statement failed: {0}")]
    Statement(String),

    /// The worker died while this task was in flight.
    #[error("worker {0} died while executing the task")]
    WorkerDied(usize),

    /// Every worker slot has been retired; nothing can run this task.
    #[error("no live worker slots remain")]
    NoCapacity,

    /// A dispatch found the target worker still executing. Protocol error.
    #[error("worker {0} was dispatched while busy")]
    Overcommitted(usize),

    /// A freshly allocated task id collided with a pending one. Protocol
    /// error; the new task is rejected, the pending one is untouched.
    #[error("task id {0} is already registered")]
    DuplicateTask(TaskId),

    /// The pool is shutting down; the task was rejected before dispatch.
    #[error("pool is shutting down")]
    ShuttingDown,

    /// The pool dispatcher is gone (already shut down).
    #[error("pool is closed")]
    Closed,
}
