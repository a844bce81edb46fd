//! Single-task execution with timeout and retry enforcement.
//!
//! The executor merges a task's overrides into its payload, runs the compute
//! operation under a per-attempt timeout and retries failed attempts up to
//! the configured limit. It never returns an error: every failure mode ends
//! up as a failed [`Outcome`] carrying the last attempt's error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::compute::{ComputeOperation, ComputeRequest};
use crate::dispatch::DispatchConfig;
use crate::error::TaskError;
use crate::metrics::DispatchObserver;
use crate::resources::ContextPool;

use super::task::{Outcome, Task};

/// Runs tasks through a compute operation.
pub struct TaskExecutor {
    compute: Arc<dyn ComputeOperation>,
    observer: Arc<dyn DispatchObserver>,
    task_timeout: Duration,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl TaskExecutor {
    /// Creates an executor using the timeout and retry settings of `config`.
    pub fn new(
        compute: Arc<dyn ComputeOperation>,
        observer: Arc<dyn DispatchObserver>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            compute,
            observer,
            task_timeout: config.task_timeout,
            max_attempts: config.max_attempts(),
            retry_backoff: config.retry_backoff,
        }
    }

    /// Executes `task`, checking out one context from `contexts` per attempt
    /// when a pool is given.
    pub async fn execute(&self, task: &Task, contexts: Option<&ContextPool>) -> Outcome {
        let payload = task.merged_payload();
        let mut span = TaskSpan::start(Arc::clone(&self.observer), &task.id);
        let mut last_error = TaskError::NoResult;

        for attempt in 1..=self.max_attempts {
            match self.attempt(task, &payload, attempt, contexts).await {
                Ok(metrics) => {
                    debug!(
                        task_id = %task.id,
                        attempt = attempt,
                        "Task completed successfully"
                    );
                    let outcome = Outcome::success(metrics);
                    span.finish(&outcome, false);
                    return outcome;
                }
                Err(e) => {
                    let will_retry = attempt < self.max_attempts;
                    warn!(
                        task_id = %task.id,
                        attempt = attempt,
                        error = %e,
                        will_retry = will_retry,
                        "Task attempt failed"
                    );
                    self.observer
                        .on_attempt_failed(&task.id, attempt, &e, will_retry);
                    last_error = e;

                    if will_retry && !self.retry_backoff.is_zero() {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        let outcome = Outcome::from_error(&last_error);
        span.finish(&outcome, last_error.is_timeout());
        outcome
    }

    /// Runs one attempt under the task timeout.
    async fn attempt(
        &self,
        task: &Task,
        payload: &Value,
        attempt: u32,
        contexts: Option<&ContextPool>,
    ) -> Result<Value, TaskError> {
        let run = async {
            let lease = match contexts {
                Some(pool) => Some(
                    pool.checkout()
                        .await
                        .map_err(|e| TaskError::ContextUnavailable(e.to_string()))?,
                ),
                None => None,
            };

            let request = ComputeRequest {
                task_id: &task.id,
                payload,
                attempt,
                context: lease.as_ref().map(|lease| lease.id()),
            };

            let result = AssertUnwindSafe(self.compute.compute(request))
                .catch_unwind()
                .await
                .map_err(|_| {
                    TaskError::Compute(format!(
                        "{} panicked while computing task",
                        self.compute.name()
                    ))
                })?;

            match result {
                Ok(Value::Null) => Err(TaskError::NoResult),
                Ok(metrics) => Ok(metrics),
                Err(e) => Err(TaskError::Compute(e.to_string())),
            }
        };

        match tokio::time::timeout(self.task_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Timeout(self.task_timeout)),
        }
    }
}

/// Reports task start and finish to the observer.
///
/// If the executing future is dropped before [`TaskSpan::finish`] (batch
/// deadline), the drop reports the task as abandoned so in-flight gauges
/// stay balanced.
struct TaskSpan {
    observer: Arc<dyn DispatchObserver>,
    task_id: String,
    started: Instant,
    finished: bool,
}

impl TaskSpan {
    fn start(observer: Arc<dyn DispatchObserver>, task_id: &str) -> Self {
        observer.on_task_started(task_id);
        Self {
            observer,
            task_id: task_id.to_string(),
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(&mut self, outcome: &Outcome, timed_out: bool) {
        self.finished = true;
        self.observer
            .on_task_finished(&self.task_id, outcome, self.started.elapsed(), timed_out);
    }
}

impl Drop for TaskSpan {
    fn drop(&mut self) {
        if !self.finished {
            let outcome = Outcome::from_error(&TaskError::BatchDeadline);
            self.observer
                .on_task_finished(&self.task_id, &outcome, self.started.elapsed(), true);
        }
    }
}
