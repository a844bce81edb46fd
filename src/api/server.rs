//! HTTP routes for the simulation endpoint.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::dispatch::DispatchController;
use crate::metrics::DispatchMetrics;

use super::error::ApiError;
use super::request::DispatchRequest;

/// Shared state of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DispatchController>,
    pub metrics: Option<Arc<DispatchMetrics>>,
}

impl AppState {
    pub fn new(controller: Arc<DispatchController>) -> Self {
        Self {
            controller,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/simulate", post(simulate))
        .route("/metrics", get(export_metrics))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an I/O error if the server fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "Simulation server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn simulate(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request = DispatchRequest::from_slice(&body)?;
    info!(
        batch = request.is_batch(),
        tasks = request.task_count(),
        "Received simulation request"
    );

    let dispatched = request.dispatch(&state.controller).await;
    let status = if dispatched.fatal.is_some() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    Ok((status, Json(dispatched.reply)).into_response())
}

async fn export_metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("metrics are disabled".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        metrics.export(),
    )
        .into_response())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
