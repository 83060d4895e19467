//! The dispatcher actor: owns slots, backlog, and the registry.
//!
//! すべての状態変化はこのループの中で起きる。呼び出し側・ワーカーの双方が
//! 同じチャネルにメッセージを流すので、dispatch と completion の競合は
//! 構造的に起こらない。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use async_trait::async_trait;
use crossbeam_channel::TrySendError;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::registry::{Continuation, CorrelationRegistry};
use super::slot::{SlotState, WorkerSlot};
use super::worker::{self, Completion, Dispatch};
use super::{PoolConfig, PoolCounts, StatementPool};
use crate::domain::{ExecOutcome, Statement, Task};
use crate::error::SpindleError;
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};

/// Messages serialized through the dispatcher loop. Every mutation of pool
/// state happens while handling one of these.
pub(crate) enum PoolMsg {
    Submit {
        statement: Statement,
        params: Vec<Value>,
        reply: Continuation,
    },
    Completed(Completion),
    WorkerDown {
        index: usize,
    },
    Counts {
        reply: oneshot::Sender<PoolCounts>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Cloneable pool handle; `submit` is the whole caller-facing surface.
///
/// Dropping every handle without calling [`Pool::shutdown_and_join`] leaves
/// the dispatcher and its workers parked on their channels. 後片付けは
/// shutdown_and_join で行うこと。
#[derive(Clone)]
pub struct Pool {
    tx: mpsc::UnboundedSender<PoolMsg>,
}

impl Pool {
    /// Spawn the dispatcher actor and its worker threads.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: PoolConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(config, tx.clone(), rx);
        tokio::spawn(dispatcher.run());
        Self { tx }
    }

    /// Submit one statement with bound parameters; resolves or rejects
    /// exactly once.
    pub async fn submit(
        &self,
        statement: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<ExecOutcome, SpindleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PoolMsg::Submit {
                statement: Statement::new(statement),
                params,
                reply: reply_tx,
            })
            .map_err(|_| SpindleError::Closed)?;
        reply_rx.await.map_err(|_| SpindleError::Closed)?
    }

    /// Snapshot of slot and backlog counts.
    pub async fn counts(&self) -> Result<PoolCounts, SpindleError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(PoolMsg::Counts { reply: tx })
            .map_err(|_| SpindleError::Closed)?;
        rx.await.map_err(|_| SpindleError::Closed)
    }

    /// Stop accepting work, reject the backlog, let in-flight tasks finish,
    /// then close the worker inboxes and join the threads.
    pub async fn shutdown_and_join(self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(PoolMsg::Shutdown { done: tx }).is_ok() {
            let _ = rx.await;
        }
    }
}

#[async_trait]
impl StatementPool for Pool {
    async fn submit(
        &self,
        statement: &str,
        params: Vec<Value>,
    ) -> Result<ExecOutcome, SpindleError> {
        Pool::submit(self, statement, params).await
    }
}

struct Dispatcher {
    rx: mpsc::UnboundedReceiver<PoolMsg>,
    slots: Vec<WorkerSlot>,
    backlog: VecDeque<Task>,
    registry: CorrelationRegistry,
    ids: UlidGenerator<SystemClock>,
    threads: Vec<JoinHandle<()>>,
    shutting_down: bool,
    shutdown_done: Vec<oneshot::Sender<()>>,
}

impl Dispatcher {
    fn new(
        config: PoolConfig,
        events: mpsc::UnboundedSender<PoolMsg>,
        rx: mpsc::UnboundedReceiver<PoolMsg>,
    ) -> Self {
        let worker_count = config.workers.max(1);
        let mut slots = Vec::with_capacity(worker_count);
        let mut threads = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (dispatch_tx, dispatch_rx) = crossbeam_channel::bounded(1);
            let gate = Arc::new(AtomicBool::new(false));
            threads.push(worker::spawn_worker(
                index,
                config.store.clone(),
                config.min_task_duration,
                dispatch_rx,
                Arc::clone(&gate),
                events.clone(),
            ));
            slots.push(WorkerSlot {
                index,
                state: SlotState::Idle,
                inbox: dispatch_tx,
                gate,
            });
        }
        info!(workers = worker_count, "pool dispatcher started");

        Self {
            rx,
            slots,
            backlog: VecDeque::new(),
            registry: CorrelationRegistry::new(),
            ids: UlidGenerator::new(SystemClock),
            threads,
            shutting_down: false,
            shutdown_done: Vec::new(),
        }
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                PoolMsg::Submit {
                    statement,
                    params,
                    reply,
                } => self.on_submit(statement, params, reply),
                PoolMsg::Completed(completion) => self.on_completed(completion),
                PoolMsg::WorkerDown { index } => self.on_worker_down(index),
                PoolMsg::Counts { reply } => {
                    let _ = reply.send(self.counts());
                }
                PoolMsg::Shutdown { done } => self.on_shutdown(done),
            }

            if self.shutting_down && !self.slots.iter().any(WorkerSlot::is_busy) {
                break;
            }
        }
        self.finish();
    }

    fn on_submit(&mut self, statement: Statement, params: Vec<Value>, reply: Continuation) {
        if self.shutting_down {
            let _ = reply.send(Err(SpindleError::ShuttingDown));
            return;
        }
        if self.live_slots() == 0 {
            let _ = reply.send(Err(SpindleError::NoCapacity));
            return;
        }

        let id = self.ids.next_task_id();
        if let Err(reply) = self.registry.register(id, reply) {
            error!(task_id = %id, "freshly generated task id collides with a pending one");
            let _ = reply.send(Err(SpindleError::DuplicateTask(id)));
            return;
        }

        self.backlog.push_back(Task::new(id, statement, params));
        debug!(task_id = %id, queued = self.backlog.len(), "task enqueued");
        self.drain();
    }

    /// Assign as many queued tasks to idle slots as currently possible.
    /// FIFO: always the front of the backlog, always the lowest idle index.
    fn drain(&mut self) {
        loop {
            if self.backlog.is_empty() {
                break;
            }
            let Some(slot_index) = self.slots.iter().position(WorkerSlot::is_idle) else {
                break;
            };
            let Some(task) = self.backlog.pop_front() else {
                break;
            };
            self.dispatch(slot_index, task);
        }

        if self.live_slots() == 0 {
            // Nothing can ever run these; fail them now instead of hanging.
            while let Some(task) = self.backlog.pop_front() {
                self.registry.reject(task.id, SpindleError::NoCapacity);
            }
        }
    }

    fn dispatch(&mut self, slot_index: usize, task: Task) {
        let slot = &mut self.slots[slot_index];

        // Second line of defense behind the idle check: the gate must have
        // been cleared by the worker before this slot went idle again.
        if slot.gate.swap(true, Ordering::AcqRel) {
            error!(
                worker = slot.index,
                task_id = %task.id,
                "slot marked idle while its worker is still executing"
            );
            self.registry
                .reject(task.id, SpindleError::Overcommitted(slot_index));
            return;
        }

        let message = Dispatch {
            task_id: task.id,
            statement: task.statement,
            params: task.params,
        };
        match slot.inbox.try_send(message) {
            Ok(()) => {
                slot.mark_busy(task.id);
                debug!(
                    worker = slot.index,
                    task_id = %task.id,
                    waited_ms = task.enqueued_at.elapsed().as_millis() as u64,
                    "task dispatched"
                );
            }
            Err(TrySendError::Full(_)) => {
                slot.gate.store(false, Ordering::Release);
                error!(
                    worker = slot.index,
                    task_id = %task.id,
                    "worker inbox already holds an undelivered task"
                );
                self.registry
                    .reject(task.id, SpindleError::Overcommitted(slot_index));
            }
            Err(TrySendError::Disconnected(_)) => {
                slot.gate.store(false, Ordering::Release);
                warn!(worker = slot.index, "worker inbox disconnected; retiring slot");
                slot.retire();
                self.registry
                    .reject(task.id, SpindleError::WorkerDied(slot_index));
            }
        }
    }

    fn on_completed(&mut self, completion: Completion) {
        let Completion {
            task_id,
            worker_index,
            outcome,
        } = completion;

        match self.slots.get_mut(worker_index) {
            Some(slot) => match slot.state {
                SlotState::Busy(expected) if expected == task_id => slot.mark_idle(),
                SlotState::Retired => {}
                _ => warn!(
                    worker = worker_index,
                    task_id = %task_id,
                    "completion from a slot not busy with that task"
                ),
            },
            None => warn!(worker = worker_index, "completion from unknown worker index"),
        }

        debug!(worker = worker_index, task_id = %task_id, ok = outcome.is_ok(), "task completed");
        match outcome {
            Ok(result) => self.registry.resolve(task_id, result),
            Err(message) => self
                .registry
                .reject(task_id, SpindleError::Statement(message)),
        }

        self.drain();
    }

    fn on_worker_down(&mut self, index: usize) {
        let Some(slot) = self.slots.get_mut(index) else {
            warn!(worker = index, "down event from unknown worker index");
            return;
        };
        if slot.state == SlotState::Retired {
            return;
        }

        let in_flight = slot.in_flight();
        slot.retire();
        error!(worker = index, "worker context died; slot retired");

        if let Some(task_id) = in_flight {
            self.registry.reject(task_id, SpindleError::WorkerDied(index));
        }
        self.drain();
    }

    fn on_shutdown(&mut self, done: oneshot::Sender<()>) {
        self.shutdown_done.push(done);
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!(queued = self.backlog.len(), "pool shutting down");

        // In-flight tasks run to completion; the backlog does not.
        while let Some(task) = self.backlog.pop_front() {
            self.registry.reject(task.id, SpindleError::ShuttingDown);
        }
    }

    fn finish(mut self) {
        // Closing the inboxes lets every worker fall out of recv and
        // release its connection.
        self.slots.clear();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        for done in self.shutdown_done.drain(..) {
            let _ = done.send(());
        }
        info!("pool dispatcher stopped");
    }

    fn live_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    fn counts(&self) -> PoolCounts {
        let mut counts = PoolCounts {
            queued: self.backlog.len(),
            ..PoolCounts::default()
        };
        for slot in &self.slots {
            match slot.state {
                SlotState::Idle => counts.idle += 1,
                SlotState::Busy(_) => counts.busy += 1,
                SlotState::Retired => counts.retired += 1,
            }
        }
        counts
    }
}
