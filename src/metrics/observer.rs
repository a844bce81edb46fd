//! Observer hooks emitted by the dispatch engine.
//!
//! The controller, worker pool and task executor report lifecycle events to
//! a [`DispatchObserver`]. Production code plugs in
//! [`DispatchMetrics`](super::DispatchMetrics); tests can plug in a recorder
//! and assert on the events directly.

use std::time::Duration;

use crate::dispatch::BatchSummary;
use crate::error::TaskError;
use crate::scheduler::Outcome;

/// Receiver of dispatch lifecycle events.
///
/// All methods default to no-ops. Implementations must be cheap and must not
/// block: they are called from worker tasks.
pub trait DispatchObserver: Send + Sync {
    /// A batch passed resource acquisition and is about to start workers.
    fn on_batch_started(&self, _batch_id: &str, _total: usize, _concurrency: usize) {}

    /// A worker picked up a task.
    fn on_task_started(&self, _task_id: &str) {}

    /// One attempt of a task failed. `will_retry` tells whether another
    /// attempt follows.
    fn on_attempt_failed(
        &self,
        _task_id: &str,
        _attempt: u32,
        _error: &TaskError,
        _will_retry: bool,
    ) {
    }

    /// A task reached its terminal outcome.
    fn on_task_finished(
        &self,
        _task_id: &str,
        _outcome: &Outcome,
        _elapsed: Duration,
        _timed_out: bool,
    ) {
    }

    /// A batch finished, either completely or fatally.
    fn on_batch_finished(&self, _batch_id: &str, _summary: &BatchSummary, _fatal: bool) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}
