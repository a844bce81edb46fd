//! Top-level batch dispatch.
//!
//! This module provides the [`DispatchController`], its configuration and
//! the response shapes handed back to callers.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sim_dispatch::compute::MockSimulation;
//! use sim_dispatch::dispatch::{DispatchConfig, DispatchController};
//! use sim_dispatch::scheduler::Task;
//!
//! let controller = DispatchController::new(
//!     DispatchConfig::default(),
//!     Arc::new(MockSimulation::default()),
//! )?;
//!
//! let response = controller
//!     .dispatch_batch(vec![Task::new("a", character)])
//!     .await?;
//! println!("{} / {} succeeded", response.summary.successful, response.summary.total);
//! ```

pub mod config;
pub mod controller;
pub mod response;

pub use config::DispatchConfig;
pub use controller::{BatchFailure, BatchState, DispatchController, DispatchControllerBuilder};
pub use response::{BatchResponse, BatchSummary};
