//! Ordered store of actions waiting to reach the server.

use std::collections::VecDeque;

use practice_core::model::{ActionBatch, BatchId, SyncAction};

/// Actions are queued loose and cut into a batch at flush time. A batch keeps
/// its id until the server acknowledges it, and undelivered batches always go
/// out before anything queued after them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncQueue {
    batches: VecDeque<ActionBatch>,
    pending: Vec<SyncAction>,
}

impl SyncQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from journaled state.
    #[must_use]
    pub fn from_parts(batches: Vec<ActionBatch>, pending: Vec<SyncAction>) -> Self {
        Self {
            batches: batches.into_iter().filter(|b| !b.is_empty()).collect(),
            pending,
        }
    }

    pub fn push(&mut self, action: SyncAction) {
        self.pending.push(action);
    }

    /// Move all loose actions into a new batch behind any undelivered ones,
    /// and return the batches to send, oldest first.
    pub fn cut(&mut self) -> Vec<ActionBatch> {
        if !self.pending.is_empty() {
            let actions = std::mem::take(&mut self.pending);
            self.batches.push_back(ActionBatch::new(actions));
        }
        self.batches.iter().cloned().collect()
    }

    /// Drop a delivered batch. Returns false if `id` is not the oldest batch.
    pub fn acknowledge(&mut self, id: BatchId) -> bool {
        if self.batches.front().is_some_and(|b| b.id == id) {
            self.batches.pop_front();
            return true;
        }
        false
    }

    #[must_use]
    pub fn batches(&self) -> &VecDeque<ActionBatch> {
        &self.batches
    }

    #[must_use]
    pub fn pending(&self) -> &[SyncAction] {
        &self.pending
    }

    /// Number of actions not yet acknowledged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + self.batches.iter().map(ActionBatch::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
