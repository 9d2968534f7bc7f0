//! Pipeline Coordinator
//!
//! Top-level driver of a pipeline run. The coordinator is the only writer of
//! stage and pipeline state: it validates the definition, walks the stages
//! through the dispatcher in declared order and rolls their outcomes up.

use conveyor_core::domain::definition::PipelineDefinition;
use conveyor_core::domain::execution::PipelineExecution;
use conveyor_core::dto::pipeline::PipelineRunSummary;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::{JobStatusStore, PipelineRunRepository};
use crate::service::dispatcher::{DispatchError, StageDispatcher};
use crate::service::observer::PipelineObserver;
use crate::service::validation::{self, ValidationResult};

pub struct PipelineCoordinator {
    store: Arc<JobStatusStore>,
    runs: Arc<PipelineRunRepository>,
    dispatcher: StageDispatcher,
    observer: Arc<dyn PipelineObserver>,
}

impl PipelineCoordinator {
    pub fn new(
        store: Arc<JobStatusStore>,
        runs: Arc<PipelineRunRepository>,
        dispatcher: StageDispatcher,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            store,
            runs,
            dispatcher,
            observer,
        }
    }

    /// Runs a pipeline to a terminal state
    pub async fn run(&self, definition: PipelineDefinition) -> PipelineExecution {
        let execution = PipelineExecution::new(definition);
        let cancel = self.runs.insert(&execution).await;
        self.drive(execution, cancel).await
    }

    /// Starts a pipeline run in the background and returns at once
    pub async fn submit(self: &Arc<Self>, definition: PipelineDefinition) -> PipelineRunSummary {
        let execution = PipelineExecution::new(definition);
        let cancel = self.runs.insert(&execution).await;
        let summary = PipelineRunSummary::from(&execution);

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.drive(execution, cancel).await;
        });

        summary
    }

    async fn drive(
        &self,
        mut run: PipelineExecution,
        cancel: CancellationToken,
    ) -> PipelineExecution {
        self.observer.pipeline_started(&run);

        if let ValidationResult::Invalid(errors) = validation::validate(&run.definition) {
            run.reject(errors);
            return self.finish(run).await;
        }

        self.store.register_run(&run).await;
        run.start();
        self.runs.save(&run).await;

        for index in 0..run.stages.len() {
            let pipeline_state = run.state();
            let result = self
                .dispatcher
                .dispatch_stage(run.id, &mut run.stages[index], pipeline_state, &cancel)
                .await;

            match result {
                Ok(_) => {
                    self.observer.stage_finished(run.id, &run.stages[index]);
                    run.recompute_state();
                    self.runs.save(&run).await;
                }
                Err(err) => {
                    self.abort(&mut run, index, err).await;
                    break;
                }
            }
        }

        run.recompute_state();
        self.finish(run).await
    }

    /// Stops a run at stage `from`: pending jobs of that stage and every later
    /// one are canceled, running jobs are left to finish
    async fn abort(&self, run: &mut PipelineExecution, from: usize, err: DispatchError) {
        tracing::error!("Pipeline run {} aborted: {}", run.id, err);

        let remaining: Vec<Uuid> = run.stages[from..]
            .iter()
            .flat_map(|stage| stage.job_ids())
            .collect();
        self.store.cancel_pending(&remaining, &err.to_string()).await;

        for stage in &mut run.stages[from..] {
            stage.refresh_jobs(self.store.snapshot(&stage.job_ids()).await);
            stage.abort();
            self.observer.stage_finished(run.id, stage);
        }

        run.abort(err.terminal_state(), err.to_string());
    }

    /// Snapshot of a run with job states as last reported by workers
    ///
    /// Stage records are only rewritten at stage boundaries, so the jobs of
    /// a run still in flight are read back from the status store.
    pub async fn current(&self, id: Uuid) -> Option<PipelineExecution> {
        let mut run = self.runs.get(id).await?;
        if !run.state().is_terminal() {
            for stage in &mut run.stages {
                stage.refresh_jobs(self.store.snapshot(&stage.job_ids()).await);
            }
        }
        Some(run)
    }

    async fn finish(&self, run: PipelineExecution) -> PipelineExecution {
        self.runs.save(&run).await;
        self.observer.pipeline_finished(&run);

        for evicted in self.runs.evict_finished().await {
            tracing::debug!("Evicting finished pipeline run {}", evicted.id);
            let jobs: Vec<Uuid> = evicted
                .stages
                .iter()
                .flat_map(|stage| stage.job_ids())
                .collect();
            self.store.forget(&jobs).await;
        }

        run
    }
}
