//! Observability for the dispatch engine.
//!
//! Dispatch components emit lifecycle events through the injectable
//! [`DispatchObserver`] trait. [`DispatchMetrics`] turns those events into
//! Prometheus counters (dispatched, succeeded, failed, timed out, failed
//! attempts) and duration histograms.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sim_dispatch::metrics::DispatchMetrics;
//!
//! let metrics = Arc::new(DispatchMetrics::new()?);
//! let controller = DispatchController::builder(compute)
//!     .observer(metrics.clone())
//!     .build()?;
//!
//! // Export metrics for Prometheus scraping
//! let text = metrics.export();
//! ```

pub mod observer;
pub mod prometheus;

pub use observer::{DispatchObserver, NoopObserver};
pub use self::prometheus::DispatchMetrics;
