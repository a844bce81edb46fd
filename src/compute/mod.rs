//! Compute operations executed for each task.
//!
//! A compute operation is the per-task unit of work the dispatch engine
//! schedules. It is given the merged payload of one task and either produces
//! a structured metrics value or fails. The engine enforces timeouts and
//! retries around it; implementations only need to be safe to call
//! concurrently.

pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::resources::ContextId;

pub use mock::{MockSimulation, MockSimulationConfig};

/// Input handed to a compute operation for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct ComputeRequest<'a> {
    /// Identifier of the task being executed.
    pub task_id: &'a str,
    /// Payload with overrides already applied.
    pub payload: &'a Value,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Execution context checked out for this attempt, if the batch uses a
    /// context pool.
    pub context: Option<ContextId>,
}

/// Error type for compute operations.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Trait for per-task compute operations.
#[async_trait]
pub trait ComputeOperation: Send + Sync {
    /// Returns a short name used in logs.
    fn name(&self) -> &str {
        "compute"
    }

    /// Runs one attempt. A `null` value is treated as "no result".
    async fn compute(&self, request: ComputeRequest<'_>) -> Result<Value, ComputeError>;
}
