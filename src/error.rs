//! Error types for sim-dispatch operations.
//!
//! Defines error types for each layer of the engine:
//! - Per-task execution failures (converted to failed outcomes, never propagated)
//! - Batch-level fatal failures (resource acquisition, worker pool)
//! - Caller input errors at the request boundary
//! - Configuration loading and validation

use std::time::Duration;

use thiserror::Error;

/// Errors produced by a single task attempt.
///
/// These never escape the task executor; the last one is rendered into
/// `Outcome::error` when a task exhausts its attempts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    #[error("{0}")]
    Compute(String),

    #[error("Task timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Compute operation returned no result")]
    NoResult,

    #[error("Execution context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("Batch deadline exceeded")]
    BatchDeadline,
}

impl TaskError {
    /// Returns true if the attempt was abandoned because it ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout(_) | TaskError::BatchDeadline)
    }
}

/// Fatal errors that abort a whole batch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to acquire execution resources: {0}")]
    ResourceUnavailable(String),

    #[error("Worker {worker_id} panicked: {message}")]
    WorkerPanicked { worker_id: String, message: String },

    #[error("Invalid dispatch configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors caused by a malformed inbound request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Request body must be a JSON object")]
    NotAnObject,

    #[error("Malformed request: {0}")]
    Malformed(String),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
