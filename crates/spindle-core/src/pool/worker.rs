//! Worker execution context: one thread, one exclusive connection.
//!
//! ワーカーは inbox から 1 件ずつ受け取り、完了を報告してから次を受け取る。
//! 接続はスレッド起動時に一度だけ開き、どの経路で抜けても `Drop` で閉じる。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use super::dispatcher::PoolMsg;
use crate::domain::{ExecOutcome, Statement, TaskId};
use crate::store::{StoreConfig, StoreConn};

/// Dispatch message: dispatcher → worker.
#[derive(Debug)]
pub(crate) struct Dispatch {
    pub task_id: TaskId,
    pub statement: Statement,
    pub params: Vec<serde_json::Value>,
}

/// Completion message: worker → dispatcher. The error side carries the
/// store's error description; the caller-facing classification happens on
/// the dispatcher side.
#[derive(Debug)]
pub(crate) struct Completion {
    pub task_id: TaskId,
    pub worker_index: usize,
    pub outcome: Result<ExecOutcome, String>,
}

/// Posts `WorkerDown` on every exit path, panic unwind included, so the
/// dispatcher can retire the slot and reject its in-flight task.
struct DownGuard {
    index: usize,
    events: UnboundedSender<PoolMsg>,
}

impl Drop for DownGuard {
    fn drop(&mut self) {
        // The dispatcher may already be gone during shutdown.
        let _ = self.events.send(PoolMsg::WorkerDown { index: self.index });
    }
}

pub(crate) fn spawn_worker(
    index: usize,
    store: StoreConfig,
    min_task_duration: Option<Duration>,
    inbox: Receiver<Dispatch>,
    gate: Arc<AtomicBool>,
    events: UnboundedSender<PoolMsg>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(format!("spindle-worker-{index}"))
        .spawn(move || run_worker(index, store, min_task_duration, inbox, gate, events))
        .expect("spawn worker thread")
}

fn run_worker(
    index: usize,
    store: StoreConfig,
    min_task_duration: Option<Duration>,
    inbox: Receiver<Dispatch>,
    gate: Arc<AtomicBool>,
    events: UnboundedSender<PoolMsg>,
) {
    let _down = DownGuard {
        index,
        events: events.clone(),
    };

    let mut conn = match StoreConn::open(&store) {
        Ok(conn) => conn,
        Err(err) => {
            error!(worker = index, %err, "failed to open store connection");
            return;
        }
    };
    info!(worker = index, path = %store.path.display(), "connected to store");

    // 1 件ずつ: recv → execute → complete。inbox が閉じたら終了。
    while let Ok(msg) = inbox.recv() {
        debug!(worker = index, task_id = %msg.task_id, "executing statement");

        if let Some(pause) = min_task_duration {
            thread::sleep(pause);
        }

        let outcome = conn
            .execute(&msg.statement, &msg.params)
            .map_err(|err| err.to_string());

        // Clear the gate before reporting: the dispatcher may only
        // re-dispatch this slot after seeing the completion.
        gate.store(false, Ordering::Release);

        let completion = Completion {
            task_id: msg.task_id,
            worker_index: index,
            outcome,
        };
        if events.send(PoolMsg::Completed(completion)).is_err() {
            break; // dispatcher is gone
        }
    }

    debug!(worker = index, "inbox closed; releasing connection");
}
