//! API Module
//!
//! HTTP surface of the orchestrator. Runners claim work and report status
//! here; operators submit, inspect and cancel pipeline runs.

pub mod error;
pub mod health;
pub mod job;
pub mod pipeline;
pub mod queue;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::repository::{JobStatusStore, PipelineRunRepository, WorkQueue};
use crate::service::PipelineCoordinator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn WorkQueue>,
    pub store: Arc<JobStatusStore>,
    pub runs: Arc<PipelineRunRepository>,
    pub coordinator: Arc<PipelineCoordinator>,
    pub queue_name: String,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Work queue endpoints
        .route("/api/queue/{queue}", get(queue::queue_info))
        .route("/api/queue/{queue}/claim", post(queue::claim_job))
        // Status channel
        .route(
            "/api/jobs/{id}/status",
            get(job::get_job_status).put(job::report_job_status),
        )
        .route("/api/jobs/{id}/dependencies", get(job::get_dependency_states))
        // Pipeline runs
        .route(
            "/api/pipelines",
            get(pipeline::list_runs).post(pipeline::submit_pipeline),
        )
        .route("/api/pipelines/{id}", get(pipeline::get_run))
        .route("/api/pipelines/{id}/cancel", post(pipeline::cancel_run))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
