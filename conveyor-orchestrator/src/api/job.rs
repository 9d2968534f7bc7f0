//! Job API Handlers
//!
//! The status channel between runners and the orchestrator.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use conveyor_core::dto::job::{DependencyStates, JobStatus, StatusUpdate};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::job_service;

/// PUT /api/jobs/{id}/status
/// Report a job state transition
pub async fn report_job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<StatusCode> {
    tracing::debug!("Status report for job {}: {}", id, update.state);

    job_service::report_status(&state.store, id, update).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/jobs/{id}/status
/// Get the current state of a job
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobStatus>> {
    let status = job_service::job_status(&state.store, id).await?;
    Ok(Json(status))
}

/// GET /api/jobs/{id}/dependencies
/// Get the outcomes of the jobs a job needs
pub async fn get_dependency_states(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DependencyStates>> {
    let states = job_service::dependency_states(&state.store, id).await?;
    Ok(Json(states))
}
