//! Deferred task queue.
//!
//! Work that must not run inside the caller's stack (it may be a source
//! callback) is posted here and executed on the next turn, when the embedder
//! calls [`ReparentingModel::run_pending_tasks`](crate::ReparentingModel::run_pending_tasks).
//! Posting a task that is already queued is a no-op, so any number of
//! registrations in one turn coalesce into a single apply.

use strum::IntoStaticStr;

/// A unit of deferred work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Task {
    /// Rebuild with the queued synthetic nodes.
    ApplyPendingNodes,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// FIFO of distinct tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: Vec<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` unless it is already queued. Returns whether it was added.
    pub fn post(&mut self, task: Task) -> bool {
        if self.queue.contains(&task) {
            tracing::trace!(task = task.as_str(), "task already queued, coalescing");
            return false;
        }
        self.queue.push(task);
        true
    }

    /// Drain everything queued so far, in posting order.
    pub fn take_all(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.queue)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
