//! HTTP error responses.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::dispatch::BatchResponse;
use crate::error::RequestError;

/// Errors returned by HTTP handlers before a batch is started.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Undecodable request. Answered as a fatal batch with no tasks.
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Not Found: {0}")]
    NotFound(String),
}

impl ApiError {
    /// Status code returned for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let message = self.to_string();
        warn!(status = status_code.as_u16(), error = %message, "Rejecting request");

        let body = match self {
            ApiError::Request(_) => fatal_body(&message),
            ApiError::NotFound(_) => json!({ "error": message }),
        };
        (status_code, Json(body)).into_response()
    }
}

/// Empty fatal batch response with the error attached.
fn fatal_body(message: &str) -> Value {
    let response = BatchResponse::fatal(std::iter::empty::<&str>(), message, Duration::ZERO);
    let mut body = serde_json::to_value(response).unwrap_or_else(|_| json!({}));
    if let Value::Object(fields) = &mut body {
        fields.insert("error".to_string(), Value::String(message.to_string()));
    }
    body
}
