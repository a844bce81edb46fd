//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use sim_dispatch::compute::{ComputeError, ComputeOperation, ComputeRequest};
use sim_dispatch::dispatch::BatchSummary;
use sim_dispatch::error::TaskError;
use sim_dispatch::metrics::DispatchObserver;
use sim_dispatch::resources::{ContextPool, ResourceError, ResourceProvider};
use sim_dispatch::scheduler::{Outcome, Task};

/// Behavior of one task id in [`ScriptedCompute`].
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed after the delay.
    Succeed,
    /// Fail every attempt with `attempt N failed`.
    AlwaysFail,
    /// Fail the first `n` attempts, then succeed.
    FailTimes(u32),
    /// Never resolve.
    Hang,
    /// Resolve with `null`.
    ReturnNull,
}

/// Compute fake with per-id scripts and in-flight instrumentation.
pub struct ScriptedCompute {
    scripts: HashMap<String, Script>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    contexts: Mutex<Vec<usize>>,
}

impl ScriptedCompute {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(mut self, id: &str, script: Script) -> Self {
        self.scripts.insert(id.to_string(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn contexts_seen(&self) -> Vec<usize> {
        self.contexts.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ComputeOperation for ScriptedCompute {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn compute(&self, request: ComputeRequest<'_>) -> Result<Value, ComputeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(context) = request.context {
            self.contexts.lock().unwrap().push(context.0);
        }

        let script = self
            .scripts
            .get(request.task_id)
            .cloned()
            .unwrap_or(Script::Succeed);

        if let Script::Hang = script {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match script {
            Script::Succeed | Script::Hang => Ok(json!({
                "task": request.task_id,
                "attempt": request.attempt
            })),
            Script::AlwaysFail => Err(ComputeError::Failed(format!(
                "attempt {} failed",
                request.attempt
            ))),
            Script::FailTimes(n) if request.attempt <= n => Err(ComputeError::Failed(format!(
                "attempt {} failed",
                request.attempt
            ))),
            Script::FailTimes(_) => Ok(json!({
                "task": request.task_id,
                "attempt": request.attempt
            })),
            Script::ReturnNull => Ok(Value::Null),
        }
    }
}

/// Provider that always fails to acquire.
pub struct OfflineProvider;

#[async_trait]
impl ResourceProvider for OfflineProvider {
    async fn acquire(&self, _capacity: usize) -> Result<ContextPool, ResourceError> {
        Err(ResourceError::Unavailable("simulation cluster offline".to_string()))
    }

    async fn release(&self, _pool: ContextPool) {}
}

/// Observer recording every event as a compact string.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl DispatchObserver for RecordingObserver {
    fn on_batch_started(&self, _batch_id: &str, total: usize, concurrency: usize) {
        self.push(format!("batch_started total={} concurrency={}", total, concurrency));
    }

    fn on_task_started(&self, task_id: &str) {
        self.push(format!("task_started {}", task_id));
    }

    fn on_attempt_failed(
        &self,
        task_id: &str,
        attempt: u32,
        _error: &TaskError,
        will_retry: bool,
    ) {
        self.push(format!(
            "attempt_failed {} attempt={} retry={}",
            task_id, attempt, will_retry
        ));
    }

    fn on_task_finished(
        &self,
        task_id: &str,
        outcome: &Outcome,
        _elapsed: Duration,
        timed_out: bool,
    ) {
        self.push(format!(
            "task_finished {} success={} timed_out={}",
            task_id, outcome.success, timed_out
        ));
    }

    fn on_batch_finished(&self, _batch_id: &str, summary: &BatchSummary, fatal: bool) {
        self.push(format!(
            "batch_finished total={} successful={} failed={} fatal={}",
            summary.total, summary.successful, summary.failed, fatal
        ));
    }
}

/// Observer that panics when a task starts, taking its worker down.
pub struct PanickingObserver;

impl DispatchObserver for PanickingObserver {
    fn on_task_started(&self, task_id: &str) {
        panic!("observer exploded on {}", task_id);
    }
}

/// Builds tasks with the given ids and an empty character payload.
pub fn tasks(ids: &[&str]) -> Vec<Task> {
    ids.iter()
        .map(|id| Task::new(*id, json!({"name": id})))
        .collect()
}

pub fn shared(compute: ScriptedCompute) -> Arc<ScriptedCompute> {
    Arc::new(compute)
}
