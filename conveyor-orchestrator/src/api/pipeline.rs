//! Pipeline API Handlers
//!
//! Submit, inspect and cancel pipeline runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use conveyor_core::domain::definition::PipelineDefinition;
use conveyor_core::domain::execution::PipelineExecution;
use conveyor_core::dto::pipeline::PipelineRunSummary;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/pipelines
/// Start a run of a parsed pipeline definition
pub async fn submit_pipeline(
    State(state): State<AppState>,
    Json(definition): Json<PipelineDefinition>,
) -> ApiResult<(StatusCode, Json<PipelineRunSummary>)> {
    tracing::info!("Submitting pipeline: {}", definition.name);

    let summary = state.coordinator.submit(definition).await;

    Ok((StatusCode::ACCEPTED, Json(summary)))
}

/// GET /api/pipelines
/// List all runs
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<PipelineRunSummary>> {
    Json(state.runs.list().await)
}

/// GET /api/pipelines/{id}
/// Current view of a run, including job states reported mid-stage
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineExecution>> {
    tracing::debug!("Getting run: {}", id);

    state
        .coordinator
        .current(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}

/// POST /api/pipelines/{id}/cancel
/// Request cooperative cancellation of a run
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Canceling run: {}", id);

    if state.runs.cancel(id).await {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::NotFound(format!("Run {} not found", id)))
    }
}
