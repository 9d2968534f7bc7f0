//! Job runner
//!
//! Runs one claimed job to a terminal state: waits for the jobs it needs,
//! drives its container through create/start/wait/remove and reports every
//! transition over the status channel.

use conveyor_core::domain::execution::JobExecution;
use conveyor_core::domain::state::{DependencyGate, ExecutionState, dependency_gate};
use conveyor_core::dto::job::{JobExecutionInfo, StatusUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::container::{ContainerLease, ContainerRuntime, ContainerSpec, compose_script};
use crate::repository::{StatusRepository, is_rejection};

/// What the dependency wait ended with
enum Gate {
    Ready,
    Blocked(String),
}

/// Executes claimed jobs
pub struct JobRunner {
    statuses: Arc<dyn StatusRepository>,
    runtime: Arc<dyn ContainerRuntime>,
    dependency_poll_interval: Duration,
}

impl JobRunner {
    pub fn new(
        statuses: Arc<dyn StatusRepository>,
        runtime: Arc<dyn ContainerRuntime>,
        dependency_poll_interval: Duration,
    ) -> Self {
        Self {
            statuses,
            runtime,
            dependency_poll_interval,
        }
    }

    /// Runs `info` and returns the terminal state this runner computed
    ///
    /// The returned state is authoritative locally even when reporting it to
    /// the orchestrator failed. A job whose Running report is refused is
    /// never started and ends `Canceled`.
    pub async fn run(&self, info: &JobExecutionInfo, cancel: &CancellationToken) -> ExecutionState {
        let mut job = info.to_execution();
        info!(
            "Running job {} ({}/{}) of pipeline run {}",
            job.id, job.stage, job.definition.name, job.pipeline_execution_id
        );

        if let Err(e) = self.transition(&mut job, ExecutionState::Running, None).await {
            if is_rejection(&e) {
                warn!("Orchestrator refused to start job {}, skipping it", job.id);
                let _ = job.transition(ExecutionState::Canceled, Some(format!("{:#}", e)));
                return job.state();
            }
        }

        if !job.definition.needs.is_empty() {
            if let Gate::Blocked(reason) = self.wait_for_dependencies(&job, cancel).await {
                info!("Job {} will not start: {}", job.id, reason);
                let _ = self
                    .transition(&mut job, ExecutionState::Canceled, Some(reason))
                    .await;
                return job.state();
            }
        }

        let (state, message) = self.execute(&mut job, info).await;
        let _ = self.transition(&mut job, state, message).await;

        info!("Job {} finished as {}", job.id, job.state());
        job.state()
    }

    /// Polls the status channel until every needed job is terminal
    async fn wait_for_dependencies(&self, job: &JobExecution, cancel: &CancellationToken) -> Gate {
        let needs = &job.definition.needs;
        debug!("Job {} waiting for {:?}", job.id, needs);

        loop {
            match self.statuses.dependency_states(job.id).await {
                Ok(outcomes) => match dependency_gate(needs, &outcomes) {
                    DependencyGate::Ready => return Gate::Ready,
                    DependencyGate::Blocked(reason) => return Gate::Blocked(reason),
                    DependencyGate::Waiting => {}
                },
                Err(e) => warn!("Dependency lookup for job {} failed: {:#}", job.id, e),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Gate::Blocked("runner is shutting down".to_string());
                }
                _ = tokio::time::sleep(self.dependency_poll_interval) => {}
            }
        }
    }

    /// Runs the job container and maps its exit to a terminal state
    ///
    /// The container is removed on every path once it was created.
    async fn execute(
        &self,
        job: &mut JobExecution,
        info: &JobExecutionInfo,
    ) -> (ExecutionState, Option<String>) {
        let spec = ContainerSpec {
            name: format!("conveyor-{}", job.id),
            image: job.definition.image.clone(),
            script: compose_script(&job.definition.script),
            env: info.globals.clone(),
        };

        let lease = match ContainerLease::acquire(Arc::clone(&self.runtime), &spec).await {
            Ok(lease) => lease,
            Err(e) => {
                error!("Failed to create container for job {}: {:#}", job.id, e);
                return (
                    ExecutionState::Failed,
                    Some(format!("Failed to create container: {:#}", e)),
                );
            }
        };
        job.assign_container(lease.handle());

        let result = lease.run_to_completion().await;
        lease.release().await;

        match result {
            Ok(0) => (ExecutionState::Success, None),
            Ok(code) => {
                if job.definition.allow_failure {
                    info!("Job {} exited with {} (failure allowed)", job.id, code);
                }
                (
                    ExecutionState::Failed,
                    Some(format!("Container exited with code {}", code)),
                )
            }
            Err(e) => {
                error!("Container for job {} failed to run: {:#}", job.id, e);
                (
                    ExecutionState::Failed,
                    Some(format!("Container failed to run: {:#}", e)),
                )
            }
        }
    }

    /// Applies `state` locally and reports it; the report error is returned
    async fn transition(
        &self,
        job: &mut JobExecution,
        state: ExecutionState,
        message: Option<String>,
    ) -> anyhow::Result<()> {
        if let Err(e) = job.transition(state, message.clone()) {
            warn!("Job {} cannot move to {}: {}", job.id, state, e);
            return Ok(());
        }

        let update =
            StatusUpdate::new(state, message).with_container(job.container_id().map(str::to_string));
        self.statuses.report(job.id, &update).await.inspect_err(|e| {
            error!("Failed to report {} for job {}: {:#}", state, job.id, e);
        })
    }
}
