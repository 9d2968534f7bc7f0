//! Pipeline lifecycle observer
//!
//! The coordinator and dispatcher report lifecycle events through an injected
//! observer instead of logging directly.

use conveyor_core::domain::execution::{PipelineExecution, StageExecution};
use uuid::Uuid;

/// Receives pipeline lifecycle events; every hook defaults to a no-op
pub trait PipelineObserver: Send + Sync {
    fn pipeline_started(&self, _run: &PipelineExecution) {}

    fn stage_started(&self, _run_id: Uuid, _stage: &StageExecution) {}

    fn stage_finished(&self, _run_id: Uuid, _stage: &StageExecution) {}

    fn pipeline_finished(&self, _run: &PipelineExecution) {}
}

/// Emits lifecycle events as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn pipeline_started(&self, run: &PipelineExecution) {
        tracing::info!(
            run_id = %run.id,
            pipeline = %run.definition.name,
            stages = run.stages.len(),
            "Pipeline run started"
        );
    }

    fn stage_started(&self, run_id: Uuid, stage: &StageExecution) {
        tracing::info!(
            run_id = %run_id,
            stage = %stage.name,
            jobs = stage.jobs.len(),
            "Stage dispatched"
        );
    }

    fn stage_finished(&self, run_id: Uuid, stage: &StageExecution) {
        tracing::info!(
            run_id = %run_id,
            stage = %stage.name,
            state = %stage.state(),
            "Stage finished"
        );
    }

    fn pipeline_finished(&self, run: &PipelineExecution) {
        if run.errors.is_empty() {
            tracing::info!(run_id = %run.id, state = %run.state(), "Pipeline run finished");
        } else {
            tracing::warn!(
                run_id = %run.id,
                state = %run.state(),
                errors = ?run.errors,
                "Pipeline run finished with errors"
            );
        }
    }
}
