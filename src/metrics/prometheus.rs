//! Prometheus metrics for the dispatch engine.
//!
//! Each [`DispatchMetrics`] owns its registry, so independent engines (and
//! tests) never share counters.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use super::observer::DispatchObserver;
use crate::dispatch::BatchSummary;
use crate::error::TaskError;
use crate::scheduler::Outcome;

/// Counters, gauges and histograms describing dispatch activity.
#[derive(Clone)]
pub struct DispatchMetrics {
    registry: Registry,
    tasks_dispatched: IntCounter,
    tasks_succeeded: IntCounter,
    tasks_failed: IntCounter,
    tasks_timed_out: IntCounter,
    attempt_failures: IntCounterVec,
    tasks_in_flight: IntGauge,
    task_duration: Histogram,
    batch_duration: Histogram,
    batches: IntCounterVec,
}

impl DispatchMetrics {
    /// Creates all metrics and registers them with a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric definition is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Task metrics
        let tasks_dispatched = IntCounter::new(
            "sim_dispatch_tasks_dispatched_total",
            "Total number of tasks picked up by workers",
        )?;
        let tasks_succeeded = IntCounter::new(
            "sim_dispatch_tasks_succeeded_total",
            "Total number of tasks that finished successfully",
        )?;
        let tasks_failed = IntCounter::new(
            "sim_dispatch_tasks_failed_total",
            "Total number of tasks that finished with a failure",
        )?;
        let tasks_timed_out = IntCounter::new(
            "sim_dispatch_tasks_timed_out_total",
            "Total number of tasks whose last attempt timed out",
        )?;
        let attempt_failures = IntCounterVec::new(
            Opts::new(
                "sim_dispatch_attempt_failures_total",
                "Failed attempts, labeled by error kind and whether a retry followed",
            ),
            &["kind", "retried"],
        )?;
        let tasks_in_flight = IntGauge::new(
            "sim_dispatch_tasks_in_flight",
            "Number of tasks currently executing",
        )?;
        let task_duration = Histogram::with_opts(
            HistogramOpts::new(
                "sim_dispatch_task_duration_seconds",
                "Task duration in seconds including retries",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 240.0]),
        )?;

        // Batch metrics
        let batch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "sim_dispatch_batch_duration_seconds",
                "Batch wall-clock duration in seconds",
            )
            .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;
        let batches = IntCounterVec::new(
            Opts::new("sim_dispatch_batches_total", "Total batches by final status"),
            &["status"],
        )?;

        registry.register(Box::new(tasks_dispatched.clone()))?;
        registry.register(Box::new(tasks_succeeded.clone()))?;
        registry.register(Box::new(tasks_failed.clone()))?;
        registry.register(Box::new(tasks_timed_out.clone()))?;
        registry.register(Box::new(attempt_failures.clone()))?;
        registry.register(Box::new(tasks_in_flight.clone()))?;
        registry.register(Box::new(task_duration.clone()))?;
        registry.register(Box::new(batch_duration.clone()))?;
        registry.register(Box::new(batches.clone()))?;

        tracing::debug!("Dispatch metrics registered");

        Ok(Self {
            registry,
            tasks_dispatched,
            tasks_succeeded,
            tasks_failed,
            tasks_timed_out,
            attempt_failures,
            tasks_in_flight,
            task_duration,
            batch_duration,
            batches,
        })
    }

    /// Export all metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }

        String::from_utf8(buffer)
            .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
    }

    pub fn tasks_dispatched(&self) -> u64 {
        self.tasks_dispatched.get()
    }

    pub fn tasks_succeeded(&self) -> u64 {
        self.tasks_succeeded.get()
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.get()
    }

    pub fn tasks_timed_out(&self) -> u64 {
        self.tasks_timed_out.get()
    }

    pub fn tasks_in_flight(&self) -> i64 {
        self.tasks_in_flight.get()
    }
}

fn error_kind(error: &TaskError) -> &'static str {
    match error {
        TaskError::Compute(_) => "compute",
        TaskError::Timeout(_) => "timeout",
        TaskError::NoResult => "no_result",
        TaskError::ContextUnavailable(_) => "context",
        TaskError::BatchDeadline => "batch_deadline",
    }
}

impl DispatchObserver for DispatchMetrics {
    fn on_task_started(&self, _task_id: &str) {
        self.tasks_dispatched.inc();
        self.tasks_in_flight.inc();
    }

    fn on_attempt_failed(
        &self,
        _task_id: &str,
        _attempt: u32,
        error: &TaskError,
        will_retry: bool,
    ) {
        let retried = if will_retry { "true" } else { "false" };
        self.attempt_failures
            .with_label_values(&[error_kind(error), retried])
            .inc();
    }

    fn on_task_finished(
        &self,
        _task_id: &str,
        outcome: &Outcome,
        elapsed: Duration,
        timed_out: bool,
    ) {
        self.tasks_in_flight.dec();
        if outcome.success {
            self.tasks_succeeded.inc();
        } else {
            self.tasks_failed.inc();
        }
        if timed_out {
            self.tasks_timed_out.inc();
        }
        self.task_duration.observe(elapsed.as_secs_f64());
    }

    fn on_batch_finished(&self, _batch_id: &str, summary: &BatchSummary, fatal: bool) {
        let status = if fatal { "fatal" } else { "complete" };
        self.batches.with_label_values(&[status]).inc();
        self.batch_duration
            .observe(Duration::from_millis(summary.duration).as_secs_f64());
    }
}
