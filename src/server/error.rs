//! Process-wide fault boundary
//!
//! Everything that escapes a handler, either an internal fault returned as
//! [`ApiError`] or a panic caught by the router-wide layer, is answered with
//! HTTP 500 and `{"detail": <description>}`.

use crate::error::RemovalError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::any::Any;
use tracing::error;

/// Body of a 500 response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultBody {
    pub detail: String,
}

/// Error wrapper turning internal faults into 500 responses
#[derive(Debug)]
pub struct ApiError(pub RemovalError);

impl From<RemovalError> for ApiError {
    fn from(err: RemovalError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        fault_response(self.0.to_string())
    }
}

/// Build the fixed-shape 500 response
pub fn fault_response(detail: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(FaultBody { detail }),
    )
        .into_response()
}

/// Panic handler for `tower_http::catch_panic::CatchPanicLayer`
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "unknown internal error".to_string()
    };

    error!(detail = %detail, "Request handler panicked");

    let mut response = fault_response(detail);
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}
