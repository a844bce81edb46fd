//! sim-dispatch: bounded-concurrency batch dispatch for simulation workloads.
//!
//! This library executes batches of independent simulation tasks with a
//! concurrency cap, per-task timeouts and retries, and aggregates one outcome
//! per task into a summarized response.

// Core modules
pub mod api;
pub mod cli;
pub mod compute;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod resources;
pub mod scheduler;

// Re-export commonly used error types
pub use error::{ConfigError, DispatchError, RequestError, TaskError};
