//! Worker slot bookkeeping (dispatcher side).

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crossbeam_channel::Sender;

use super::worker::Dispatch;
use crate::domain::TaskId;

/// Slot status as the dispatcher tracks it.
///
/// Transitions:
/// - Idle -> Busy(id): exactly when a task is dispatched
/// - Busy(id) -> Idle: exactly when that task's completion arrives
/// - any -> Retired: worker death; terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy(TaskId),
    Retired,
}

pub(crate) struct WorkerSlot {
    pub index: usize,
    pub state: SlotState,

    /// Dispatch inbox owned by the worker thread. Bounded(1): the channel
    /// never holds more than the single in-flight task.
    pub inbox: Sender<Dispatch>,

    /// Second line of defense against double dispatch: set here when a task
    /// is sent, cleared by the worker once it finishes executing.
    pub gate: Arc<AtomicBool>,
}

impl WorkerSlot {
    pub fn is_idle(&self) -> bool {
        matches!(self.state, SlotState::Idle)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, SlotState::Busy(_))
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.state, SlotState::Retired)
    }

    pub fn in_flight(&self) -> Option<TaskId> {
        match self.state {
            SlotState::Busy(id) => Some(id),
            _ => None,
        }
    }

    pub fn mark_busy(&mut self, id: TaskId) {
        self.state = SlotState::Busy(id);
    }

    pub fn mark_idle(&mut self) {
        self.state = SlotState::Idle;
    }

    pub fn retire(&mut self) {
        self.state = SlotState::Retired;
    }
}
