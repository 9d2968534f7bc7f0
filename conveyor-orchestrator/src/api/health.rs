//! Health Check API Handler
//!
//! Liveness endpoint; also reports whether the work queue is reachable.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::api::AppState;

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.queue.exists(&state.queue_name).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "queue": state.queue_name })),
        ),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "error": "work queue is not declared" })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "error": err.to_string() })),
        ),
    }
}
