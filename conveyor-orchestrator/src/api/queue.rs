//! Work Queue API Handlers
//!
//! Runners never talk to the broker directly; they claim through here.

use axum::{
    Json,
    extract::{Path, State},
};
use conveyor_core::dto::job::JobExecutionInfo;
use conveyor_core::dto::queue::{ClaimJob, QueueInfo};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::job_service;

/// POST /api/queue/{queue}/claim
/// Take the next runnable job, or `null` when the queue is empty
pub async fn claim_job(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Json(req): Json<ClaimJob>,
) -> ApiResult<Json<Option<JobExecutionInfo>>> {
    let claimed = job_service::claim_next(state.queue.as_ref(), &state.store, &queue).await?;

    if let Some(info) = &claimed {
        tracing::info!(
            "Runner {} claimed job {} ({}/{})",
            req.runner_id,
            info.job_id,
            info.stage,
            info.definition.name
        );
    }

    Ok(Json(claimed))
}

/// GET /api/queue/{queue}
/// Number of messages waiting in a queue
pub async fn queue_info(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<Json<QueueInfo>> {
    let outstanding = state.queue.outstanding(&queue).await?;
    Ok(Json(QueueInfo {
        name: queue,
        outstanding,
    }))
}
