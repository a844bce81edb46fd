//! Batch response shapes returned to callers.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::{AggregateSnapshot, Outcome};

/// Aggregate counts for one batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    /// Number of distinct task ids in the response.
    pub total: usize,
    /// Tasks whose outcome succeeded.
    pub successful: usize,
    /// Tasks whose outcome failed.
    pub failed: usize,
    /// Wall-clock duration of the batch in milliseconds.
    pub duration: u64,
}

/// Results and summary of one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchResponse {
    /// Outcome per task id.
    pub results: BTreeMap<String, Outcome>,
    /// Aggregate counts.
    pub summary: BatchSummary,
}

impl BatchResponse {
    /// Response for a batch without tasks.
    pub fn empty(elapsed: Duration) -> Self {
        Self {
            results: BTreeMap::new(),
            summary: BatchSummary {
                duration: duration_ms(elapsed),
                ..BatchSummary::default()
            },
        }
    }

    /// Builds a response from aggregated outcomes. Counters are taken from
    /// the snapshot, which derives them from the recorded outcomes.
    pub fn from_snapshot(snapshot: AggregateSnapshot, elapsed: Duration) -> Self {
        let summary = BatchSummary {
            total: snapshot.total(),
            successful: snapshot.successful,
            failed: snapshot.failed,
            duration: duration_ms(elapsed),
        };
        Self {
            results: snapshot.results,
            summary,
        }
    }

    /// Response for a batch that failed as a whole: every id is reported
    /// with the same failure.
    pub fn fatal<'a>(
        ids: impl IntoIterator<Item = &'a str>,
        error: &str,
        elapsed: Duration,
    ) -> Self {
        let results: BTreeMap<String, Outcome> = ids
            .into_iter()
            .map(|id| (id.to_string(), Outcome::failure(error)))
            .collect();
        let total = results.len();
        Self {
            results,
            summary: BatchSummary {
                total,
                successful: 0,
                failed: total,
                duration: duration_ms(elapsed),
            },
        }
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
