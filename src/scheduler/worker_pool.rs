//! Worker pool for draining a batch queue.
//!
//! This module provides a pool of symmetric workers that pull tasks from a
//! shared [`TaskQueue`]. Each worker runs as an independent tokio task,
//! executes one task at a time and records its outcome before pulling the
//! next one.
//!
//! # Features
//!
//! - Concurrency bounded by the number of workers
//! - Outcomes recorded as soon as each task finishes
//! - Worker panics surfaced as a fatal pool error
//! - Pool statistics tracking (throughput, peak in-flight tasks)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::DispatchError;
use crate::resources::ContextPool;

use super::aggregator::ResultAggregator;
use super::executor::TaskExecutor;
use super::queue::TaskQueue;
use super::task::Task;

/// Statistics about one pool run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Number of workers started.
    pub num_workers: usize,
    /// Tasks that finished successfully.
    pub tasks_completed: u64,
    /// Tasks that finished with a failure.
    pub tasks_failed: u64,
    /// Highest number of tasks executing at the same time.
    pub peak_in_flight: usize,
    /// Average task duration including retries.
    pub average_task_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of tasks processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            peak_in_flight: AtomicU64::new(0),
        }
    }

    fn task_started(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn task_finished(&self, success: bool, duration: Duration) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if success {
            self.tasks_completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.tasks_completed.load(Ordering::SeqCst);
        let failed = self.tasks_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total_tasks = completed + failed;
        let average_duration = if total_tasks > 0 {
            Duration::from_millis(total_duration_ms / total_tasks)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            tasks_completed: completed,
            tasks_failed: failed,
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst) as usize,
            average_task_duration: average_duration,
        }
    }
}

/// Pool of workers executing the tasks of one batch.
pub struct WorkerPool {
    executor: Arc<TaskExecutor>,
    aggregator: Arc<ResultAggregator>,
    contexts: Option<ContextPool>,
    stats: Arc<SharedPoolStats>,
    num_workers: AtomicUsize,
}

impl WorkerPool {
    /// Creates a new worker pool.
    ///
    /// # Arguments
    ///
    /// * `executor` - Executor used for every task
    /// * `aggregator` - Destination of task outcomes
    /// * `contexts` - Optional shared execution-context pool
    pub fn new(
        executor: Arc<TaskExecutor>,
        aggregator: Arc<ResultAggregator>,
        contexts: Option<ContextPool>,
    ) -> Self {
        Self {
            executor,
            aggregator,
            contexts,
            stats: Arc::new(SharedPoolStats::new()),
            num_workers: AtomicUsize::new(0),
        }
    }

    /// Runs `concurrency` workers until `queue` is drained and every
    /// dispatched task has recorded its outcome.
    ///
    /// Dropping the returned future aborts all workers.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::WorkerPanicked` if a worker task panics. The
    /// remaining workers are aborted.
    pub async fn run(
        &self,
        queue: Arc<TaskQueue>,
        concurrency: usize,
    ) -> Result<PoolStats, DispatchError> {
        let num_workers = concurrency.min(queue.len());
        if num_workers == 0 {
            return Ok(self.stats());
        }
        self.num_workers.store(num_workers, Ordering::SeqCst);

        let mut workers = JoinSet::new();
        let mut worker_ids = HashMap::with_capacity(num_workers);

        for i in 0..num_workers {
            let worker = Worker::new(
                format!("worker-{}", i),
                Arc::clone(&queue),
                Arc::clone(&self.executor),
                Arc::clone(&self.aggregator),
                self.contexts.clone(),
                Arc::clone(&self.stats),
            );
            let worker_id = worker.id().to_string();

            let handle = workers.spawn(async move {
                worker.run().await;
            });
            worker_ids.insert(handle.id(), worker_id);
        }

        info!(num_workers = num_workers, "Worker pool started");

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                let worker_id = worker_ids
                    .get(&e.id())
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                let message = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    "worker was cancelled".to_string()
                };
                error!(worker_id = %worker_id, error = %message, "Worker task failed");
                return Err(DispatchError::WorkerPanicked { worker_id, message });
            }
        }

        let stats = self.stats();
        info!(
            num_workers = num_workers,
            completed = stats.tasks_completed,
            failed = stats.tasks_failed,
            "Worker pool drained"
        );
        Ok(stats)
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats
            .to_pool_stats(self.num_workers.load(Ordering::SeqCst))
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A single worker that processes tasks from the queue.
struct Worker {
    /// Unique identifier for this worker.
    id: String,
    /// Reference to the batch queue.
    queue: Arc<TaskQueue>,
    /// Executor shared by all workers.
    executor: Arc<TaskExecutor>,
    /// Destination of outcomes.
    aggregator: Arc<ResultAggregator>,
    /// Shared execution contexts.
    contexts: Option<ContextPool>,
    /// Shared statistics.
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    fn new(
        id: String,
        queue: Arc<TaskQueue>,
        executor: Arc<TaskExecutor>,
        aggregator: Arc<ResultAggregator>,
        contexts: Option<ContextPool>,
        stats: Arc<SharedPoolStats>,
    ) -> Self {
        Self {
            id,
            queue,
            executor,
            aggregator,
            contexts,
            stats,
        }
    }

    /// Main worker loop: dequeue, execute, record, until the queue is empty.
    async fn run(self) {
        debug!(worker_id = %self.id, "Worker started");

        while let Some(task) = self.queue.dequeue() {
            self.process_task(task).await;
        }

        debug!(worker_id = %self.id, "Worker stopped, queue drained");
    }

    async fn process_task(&self, task: Task) {
        let start_time = Instant::now();
        debug!(worker_id = %self.id, task_id = %task.id, "Processing task");

        self.stats.task_started();
        let outcome = self
            .executor
            .execute(&task, self.contexts.as_ref())
            .await;
        let duration = start_time.elapsed();
        self.stats.task_finished(outcome.success, duration);

        info!(
            worker_id = %self.id,
            task_id = %task.id,
            success = outcome.success,
            duration_ms = duration.as_millis() as u64,
            "Task finished"
        );

        if self.aggregator.record(task.id, outcome) {
            debug!(worker_id = %self.id, "Replaced outcome of duplicate task id");
        }
    }

    fn id(&self) -> &str {
        &self.id
    }
}
