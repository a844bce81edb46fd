//! Batch dispatch controller.
//!
//! The controller is the entry point of the engine. For every batch it:
//!
//! 1. Short-circuits empty batches without touching any resource
//! 2. Acquires a context pool sized to the batch concurrency
//! 3. Runs a [`WorkerPool`] of `min(max_concurrency, task_count)` workers
//! 4. Releases the context pool on every exit path, including cancellation
//! 5. Builds the [`BatchResponse`] from the aggregated outcomes
//!
//! Task-level failures never abort a batch. Only resource acquisition
//! failures and worker pool failures do; in that case every task is reported
//! failed and the caller receives a [`BatchFailure`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compute::ComputeOperation;
use crate::error::{DispatchError, TaskError};
use crate::metrics::{DispatchObserver, NoopObserver};
use crate::resources::{LocalContextProvider, PoolGuard, ResourceProvider};
use crate::scheduler::{Outcome, ResultAggregator, Task, TaskExecutor, TaskQueue, WorkerPool};

use super::config::DispatchConfig;
use super::response::BatchResponse;

/// Lifecycle state of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Batch received, nothing allocated yet.
    Pending,
    /// Execution contexts acquired (or not required).
    ResourceAcquired,
    /// Workers are running.
    Dispatching,
    /// Workers stopped; outcomes are being collected.
    Aggregating,
    /// Every task has a recorded outcome.
    Complete,
    /// The batch was aborted as a whole.
    Fatal,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Pending => write!(f, "pending"),
            BatchState::ResourceAcquired => write!(f, "resource_acquired"),
            BatchState::Dispatching => write!(f, "dispatching"),
            BatchState::Aggregating => write!(f, "aggregating"),
            BatchState::Complete => write!(f, "complete"),
            BatchState::Fatal => write!(f, "fatal"),
        }
    }
}

/// A batch that failed as a whole.
///
/// Carries the fatal error and a response in which every task is failed.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct BatchFailure {
    /// The error that aborted the batch.
    pub error: DispatchError,
    /// Response with zero successes and `failed == total`.
    pub response: BatchResponse,
}

impl BatchFailure {
    /// Outcome reported for `id` in the fatal response.
    pub fn outcome_for(&self, id: &str) -> Outcome {
        self.response
            .results
            .get(id)
            .cloned()
            .unwrap_or_else(|| Outcome::failure(self.error.to_string()))
    }
}

/// Entry point dispatching batches of tasks.
pub struct DispatchController {
    config: DispatchConfig,
    compute: Arc<dyn ComputeOperation>,
    resources: Arc<dyn ResourceProvider>,
    observer: Arc<dyn DispatchObserver>,
}

impl fmt::Debug for DispatchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchController")
            .field("config", &self.config)
            .field("compute", &self.compute.name())
            .finish()
    }
}

impl DispatchController {
    /// Creates a controller with an in-process context provider and no
    /// observer.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Config` if `config` is invalid.
    pub fn new(
        config: DispatchConfig,
        compute: Arc<dyn ComputeOperation>,
    ) -> Result<Self, DispatchError> {
        Self::builder(compute).config(config).build()
    }

    /// Starts building a controller around `compute`.
    pub fn builder(compute: Arc<dyn ComputeOperation>) -> DispatchControllerBuilder {
        DispatchControllerBuilder {
            config: DispatchConfig::default(),
            compute,
            resources: None,
            observer: None,
        }
    }

    /// Returns the controller configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Executes a batch and returns the outcome of every task.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchFailure`] if execution contexts cannot be acquired or
    /// the worker pool fails. Individual task failures are reported inside
    /// the successful response.
    pub async fn dispatch_batch(&self, tasks: Vec<Task>) -> Result<BatchResponse, BatchFailure> {
        let started = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        let mut state = BatchState::Pending;

        if tasks.is_empty() {
            debug!(batch_id = %batch_id, "Empty batch, nothing to dispatch");
            return Ok(BatchResponse::empty(started.elapsed()));
        }

        let total = tasks.len();
        let ids: Vec<String> = tasks.iter().map(|task| task.id.clone()).collect();
        let concurrency = self.config.concurrency_for(total);

        info!(
            batch_id = %batch_id,
            total = total,
            concurrency = concurrency,
            compute = self.compute.name(),
            "Dispatching batch"
        );

        self.observer.on_batch_started(&batch_id, total, concurrency);

        // Dropping the guard, including on cancellation, hands the pool back.
        let guard = if self.config.use_context_pool {
            match PoolGuard::acquire(Arc::clone(&self.resources), concurrency).await {
                Ok(guard) => Some(guard),
                Err(e) => {
                    let error = DispatchError::ResourceUnavailable(e.to_string());
                    return Err(self.fail(&batch_id, &mut state, &ids, error, started));
                }
            }
        } else {
            None
        };
        advance(&batch_id, &mut state, BatchState::ResourceAcquired);

        let aggregator = Arc::new(ResultAggregator::new());
        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&self.compute),
            Arc::clone(&self.observer),
            &self.config,
        ));
        let contexts = guard.as_ref().and_then(|guard| guard.pool().cloned());
        let pool = WorkerPool::new(executor, Arc::clone(&aggregator), contexts);
        let queue = Arc::new(TaskQueue::new(tasks));

        advance(&batch_id, &mut state, BatchState::Dispatching);

        let run = pool.run(queue, concurrency);
        let result = match self.config.batch_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| limit),
            None => Ok(run.await),
        };

        if let Some(guard) = guard {
            guard.release().await;
            debug!(batch_id = %batch_id, "Released execution contexts");
        }

        match result {
            Ok(Ok(stats)) => {
                advance(&batch_id, &mut state, BatchState::Aggregating);
                debug!(
                    batch_id = %batch_id,
                    workers = stats.num_workers,
                    processed = stats.total_processed(),
                    peak_in_flight = stats.peak_in_flight,
                    average_task_ms = stats.average_task_duration.as_millis() as u64,
                    "Worker pool finished"
                );
            }
            Ok(Err(e)) => {
                return Err(self.fail(&batch_id, &mut state, &ids, e, started));
            }
            Err(limit) => {
                advance(&batch_id, &mut state, BatchState::Aggregating);
                let abandoned = mark_abandoned(&aggregator, &ids);
                warn!(
                    batch_id = %batch_id,
                    limit_ms = limit.as_millis() as u64,
                    abandoned = abandoned,
                    "Batch deadline exceeded, unfinished tasks marked failed"
                );
            }
        }

        let snapshot = aggregator.snapshot();
        if snapshot.total() < total {
            warn!(
                batch_id = %batch_id,
                submitted = total,
                distinct = snapshot.total(),
                "Batch contained duplicate task ids, last outcome kept"
            );
        }

        let response = BatchResponse::from_snapshot(snapshot, started.elapsed());
        advance(&batch_id, &mut state, BatchState::Complete);

        info!(
            batch_id = %batch_id,
            total = response.summary.total,
            successful = response.summary.successful,
            failed = response.summary.failed,
            duration_ms = response.summary.duration,
            "Batch complete"
        );
        self.observer
            .on_batch_finished(&batch_id, &response.summary, false);

        Ok(response)
    }

    /// Executes one task as a single-element batch and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchFailure`] under the same conditions as
    /// [`DispatchController::dispatch_batch`].
    pub async fn dispatch_single(&self, task: Task) -> Result<Outcome, BatchFailure> {
        let id = task.id.clone();
        let mut response = self.dispatch_batch(vec![task]).await?;
        Ok(response
            .results
            .remove(&id)
            .unwrap_or_else(|| Outcome::from_error(&TaskError::NoResult)))
    }

    fn fail(
        &self,
        batch_id: &str,
        state: &mut BatchState,
        ids: &[String],
        error: DispatchError,
        started: Instant,
    ) -> BatchFailure {
        advance(batch_id, state, BatchState::Fatal);
        error!(batch_id = %batch_id, error = %error, "Batch aborted");

        let response = BatchResponse::fatal(
            ids.iter().map(String::as_str),
            &error.to_string(),
            started.elapsed(),
        );
        self.observer
            .on_batch_finished(batch_id, &response.summary, true);

        BatchFailure { error, response }
    }
}

/// Records a deadline failure for every id without an outcome.
fn mark_abandoned(aggregator: &ResultAggregator, ids: &[String]) -> usize {
    let outcome = Outcome::from_error(&TaskError::BatchDeadline);
    ids.iter()
        .filter(|id| aggregator.record_if_absent(id, outcome.clone()))
        .count()
}

fn advance(batch_id: &str, state: &mut BatchState, next: BatchState) {
    debug!(batch_id = %batch_id, from = %state, to = %next, "Batch state transition");
    *state = next;
}

/// Builder for [`DispatchController`].
pub struct DispatchControllerBuilder {
    config: DispatchConfig,
    compute: Arc<dyn ComputeOperation>,
    resources: Option<Arc<dyn ResourceProvider>>,
    observer: Option<Arc<dyn DispatchObserver>>,
}

impl DispatchControllerBuilder {
    /// Sets the configuration.
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the execution-context provider.
    pub fn resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Sets the observer receiving lifecycle events.
    pub fn observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Builds the controller.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Config` if the configuration is invalid.
    pub fn build(self) -> Result<DispatchController, DispatchError> {
        self.config.validate()?;
        Ok(DispatchController {
            config: self.config,
            compute: self.compute,
            resources: self
                .resources
                .unwrap_or_else(|| Arc::new(LocalContextProvider::new())),
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
        })
    }
}
