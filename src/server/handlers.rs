//! Route handlers

use super::error::ApiError;
use super::state::AppState;
use crate::error::RemovalError;
use crate::service::RemovalResponse;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::Serialize;

/// `GET /`
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let ctx = minijinja::context! {
        model => state.service.model_name(),
        version => env!("CARGO_PKG_VERSION"),
    };

    state
        .templates
        .render("index.html", ctx)
        .map(Html)
        .map_err(|e| ApiError(RemovalError::internal(format!("failed to render page: {e:#}"))))
}

/// `POST /rembg`
///
/// Always 200 unless an internal fault escapes the pipeline.
pub async fn rembg(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RemovalResponse>, ApiError> {
    let response = state.service.handle(&body).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.service.model_name(),
    })
}
