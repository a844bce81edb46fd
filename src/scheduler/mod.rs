//! Bounded-concurrency execution of task batches.
//!
//! This module provides the building blocks the dispatch controller wires
//! together for every batch:
//!
//! - **TaskQueue**: per-batch FIFO of pending tasks
//! - **TaskExecutor**: runs one task with timeout and retry enforcement
//! - **WorkerPool**: N symmetric workers draining the queue
//! - **ResultAggregator**: thread-safe map of task id to outcome
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  TaskQueue   │
//!                      │   (FIFO)     │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         │   TaskExecutor (timeout + retry)      │
//!         └───────────────────┼───────────────────┘
//!                             ▼
//!                    ┌──────────────────┐
//!                    │ ResultAggregator │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sim_dispatch::scheduler::{ResultAggregator, Task, TaskExecutor, TaskQueue, WorkerPool};
//!
//! let executor = Arc::new(TaskExecutor::new(compute, observer, &config));
//! let aggregator = Arc::new(ResultAggregator::new());
//! let queue = Arc::new(TaskQueue::new(tasks));
//!
//! let pool = WorkerPool::new(executor, aggregator.clone(), None);
//! let stats = pool.run(queue, 4).await?;
//! let snapshot = aggregator.snapshot();
//! ```

pub mod aggregator;
pub mod executor;
pub mod queue;
pub mod task;
pub mod worker_pool;

// Re-export main types for convenience
pub use aggregator::{AggregateSnapshot, ResultAggregator};
pub use executor::TaskExecutor;
pub use queue::TaskQueue;
pub use task::{merge_overrides, Outcome, Task};
pub use worker_pool::{PoolStats, WorkerPool};
