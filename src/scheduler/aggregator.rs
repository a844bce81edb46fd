//! Thread-safe collector of task outcomes.
//!
//! Workers record outcomes as soon as a task finishes. All writes go through
//! one mutex, so upserts are linearizable and the success/failure counters
//! always agree with the stored outcomes.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::task::Outcome;

/// Point-in-time copy of the aggregated results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSnapshot {
    /// Outcome per task id.
    pub results: BTreeMap<String, Outcome>,
    /// Number of successful outcomes in `results`.
    pub successful: usize,
    /// Number of failed outcomes in `results`.
    pub failed: usize,
}

impl AggregateSnapshot {
    /// Number of distinct task ids recorded.
    pub fn total(&self) -> usize {
        self.results.len()
    }
}

#[derive(Debug, Default)]
struct AggregatorState {
    results: BTreeMap<String, Outcome>,
    successful: usize,
    failed: usize,
}

impl AggregatorState {
    fn count(&mut self, outcome: &Outcome, delta: isize) {
        let counter = if outcome.success {
            &mut self.successful
        } else {
            &mut self.failed
        };
        *counter = counter.saturating_add_signed(delta);
    }

    fn upsert(&mut self, id: String, outcome: Outcome) -> bool {
        self.count(&outcome, 1);
        match self.results.insert(id, outcome) {
            Some(previous) => {
                self.count(&previous, -1);
                true
            }
            None => false,
        }
    }
}

/// Collector mapping task id to outcome.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    state: Mutex<AggregatorState>,
}

impl ResultAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of a task.
    ///
    /// A second record for the same id replaces the first (last write
    /// wins). Returns true if an earlier outcome was replaced.
    pub fn record(&self, id: impl Into<String>, outcome: Outcome) -> bool {
        self.lock().upsert(id.into(), outcome)
    }

    /// Records an outcome only if the id has none yet. Returns true if the
    /// outcome was stored.
    pub fn record_if_absent(&self, id: &str, outcome: Outcome) -> bool {
        let mut state = self.lock();
        if state.results.contains_key(id) {
            return false;
        }
        state.upsert(id.to_string(), outcome);
        true
    }

    /// Returns a copy of the current results and counters.
    pub fn snapshot(&self) -> AggregateSnapshot {
        let state = self.lock();
        AggregateSnapshot {
            results: state.results.clone(),
            successful: state.successful,
            failed: state.failed,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
