//! In-memory FIFO queue of pending tasks.
//!
//! Each batch owns one queue. Workers pull from it until it is empty; the
//! queue never grows after construction, so an empty queue means every task
//! has been handed to a worker.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::task::Task;

/// Shared FIFO of tasks waiting for a worker.
#[derive(Debug)]
pub struct TaskQueue {
    pending: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    /// Creates a queue holding `tasks` in submission order.
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            pending: Mutex::new(tasks.into_iter().collect()),
        }
    }

    /// Removes and returns the next task, or `None` once drained.
    pub fn dequeue(&self) -> Option<Task> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Number of tasks not yet dequeued.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if every task was dequeued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
