//! Stage Dispatcher
//!
//! Hands one stage at a time to the worker pool: enqueue every job of the
//! stage, then hold at the drain barrier until the queue is empty and every
//! job of the stage is terminal.

use conveyor_core::domain::definition::JobDefinition;
use conveyor_core::domain::execution::StageExecution;
use conveyor_core::domain::state::ExecutionState;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::{JobStatusStore, QueueError, WorkQueue};
use crate::service::barrier::DrainBarrier;
use crate::service::observer::PipelineObserver;
use crate::service::validation::topological_order;

/// Conditions that end a pipeline run before its stages finish
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("work queue '{0}' does not exist")]
    QueueNotFound(String),

    #[error("work queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("job status store failed: {0}")]
    Store(String),

    #[error("dispatch interrupted by cancellation")]
    Interrupted,
}

impl From<QueueError> for DispatchError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(queue) => DispatchError::QueueNotFound(queue),
            QueueError::Unavailable(reason) => DispatchError::QueueUnavailable(reason),
        }
    }
}

impl DispatchError {
    /// The pipeline state a run ends in when this error stops it
    pub fn terminal_state(&self) -> ExecutionState {
        match self {
            DispatchError::Interrupted => ExecutionState::Canceled,
            _ => ExecutionState::Failed,
        }
    }
}

pub struct StageDispatcher {
    queue: Arc<dyn WorkQueue>,
    store: Arc<JobStatusStore>,
    barrier: Arc<dyn DrainBarrier>,
    observer: Arc<dyn PipelineObserver>,
    queue_name: String,
}

impl StageDispatcher {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        store: Arc<JobStatusStore>,
        barrier: Arc<dyn DrainBarrier>,
        observer: Arc<dyn PipelineObserver>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            store,
            barrier,
            observer,
            queue_name: queue_name.into(),
        }
    }

    /// Runs one stage to a terminal state
    ///
    /// When `pipeline_state` is already `Failed`, nothing is enqueued: every job
    /// of the stage is canceled and the stage settles as `Canceled`.
    ///
    /// # Arguments
    /// * `run_id` - The pipeline run the stage belongs to
    /// * `stage` - The stage record; its jobs must be registered in the store
    /// * `pipeline_state` - Aggregate state of the run before this stage
    /// * `cancel` - Cooperative cancellation of the whole run
    ///
    /// # Returns
    /// The stage's terminal state
    pub async fn dispatch_stage(
        &self,
        run_id: Uuid,
        stage: &mut StageExecution,
        pipeline_state: ExecutionState,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, DispatchError> {
        let job_ids = stage.job_ids();

        if pipeline_state == ExecutionState::Failed {
            let canceled = self
                .store
                .cancel_pending(&job_ids, "canceled after an earlier stage failed")
                .await;
            tracing::debug!(
                "Skipping stage {} of run {}: canceled {} jobs",
                stage.name,
                run_id,
                canceled
            );
            stage.refresh_jobs(self.store.snapshot(&job_ids).await);
            stage.abort();
            return Ok(stage.state());
        }

        if cancel.is_cancelled() {
            return Err(DispatchError::Interrupted);
        }

        if !self.queue.exists(&self.queue_name).await? {
            return Err(DispatchError::QueueNotFound(self.queue_name.clone()));
        }

        stage.start();
        self.observer.stage_started(run_id, stage);

        for id in enqueue_order(stage) {
            self.queue.enqueue(&self.queue_name, id.to_string()).await?;
            tracing::debug!("Enqueued job {} of stage {}", id, stage.name);
        }

        self.barrier.wait(&self.queue_name, &job_ids, cancel).await?;

        stage.refresh_jobs(self.store.snapshot(&job_ids).await);
        Ok(stage.recompute_state())
    }
}

/// Job ids of a stage, dependencies before their dependents
fn enqueue_order(stage: &StageExecution) -> Vec<Uuid> {
    let definitions: Vec<&JobDefinition> = stage.jobs.iter().map(|job| &job.definition).collect();
    topological_order(&definitions)
        .into_iter()
        .map(|i| stage.jobs[i].id)
        .collect()
}
