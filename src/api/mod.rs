//! HTTP boundary of the dispatch engine.
//!
//! Routes:
//!
//! - `POST /api/simulate`: batch (`{"simulations": [...]}`) or single
//!   (`{"character": {...}}`) simulation
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /health`: liveness probe

pub mod error;
pub mod request;
pub mod server;

pub use error::ApiError;
pub use request::{
    DispatchReply, DispatchRequest, Dispatched, SimulationRequest, SingleSimulation, SINGLE_TASK_ID,
};
pub use server::{router, serve, AppState};
