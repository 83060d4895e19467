//! Worker pool: dispatcher actor, worker threads, correlation registry.
//!
//! # 方針
//! - Dispatcher がプール状態（slots, backlog, registry）を一手に所有する
//! - Worker とは message passing のみ（共有可変状態なし）
//! - FIFO backlog, idle-gated dispatch
//!
//! Busy なワーカーに次のタスクを渡すことは決してない。完了メッセージが
//! 返ってきて初めて slot が Idle に戻り、backlog の先頭が流れる。

mod dispatcher;
mod registry;
mod slot;
mod worker;

pub use dispatcher::Pool;
pub use slot::SlotState;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ExecOutcome;
use crate::error::SpindleError;
use crate::store::StoreConfig;

/// Public seam consumed by the HTTP layer (and by tests that want to fake
/// the pool). Safe to call concurrently from many callers; each caller
/// suspends until its own task's continuation fires, never blocking the
/// dispatcher.
#[async_trait]
pub trait StatementPool: Send + Sync {
    async fn submit(
        &self,
        statement: &str,
        params: Vec<Value>,
    ) -> Result<ExecOutcome, SpindleError>;
}

/// Pool construction settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub store: StoreConfig,

    /// Number of worker execution contexts (one exclusive connection each).
    pub workers: usize,

    /// Minimum per-task execution time, simulating workload. Used by timing
    /// tests; leave `None` in production.
    pub min_task_duration: Option<Duration>,
}

impl PoolConfig {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            workers: 2,
            min_task_duration: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Point-in-time slot and backlog counts (observability hook).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    pub idle: usize,
    pub busy: usize,
    pub retired: usize,
    pub queued: usize,
}
