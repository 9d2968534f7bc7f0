//! Job Status Store
//!
//! Holds the orchestrator's view of every dispatched job. Runners write it
//! through status reports; the drain barrier and the dispatcher read it.
//!
//! A claimed job stays `Pending` until its runner's first report. The claim
//! holds for the claim timeout; once it lapses the job may be redelivered.

use conveyor_core::domain::execution::{JobExecution, PipelineExecution};
use conveyor_core::domain::state::{ExecutionState, Transition, TransitionError};
use conveyor_core::dto::job::{DependencyStates, JobExecutionInfo, StatusUpdate};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// How long a claimed job may go without a report before it is redelivered
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(30);

/// Status store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

struct JobRecord {
    execution: JobExecution,
    globals: HashMap<String, String>,
    claimed_until: Option<Instant>,
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<Uuid, JobRecord>,
    /// (run id, stage, job name) -> job id
    index: HashMap<(Uuid, String, String), Uuid>,
}

/// Concurrent map of job id to job record
pub struct JobStatusStore {
    inner: RwLock<StoreInner>,
    claim_timeout: Duration,
}

impl Default for JobStatusStore {
    fn default() -> Self {
        Self::with_claim_timeout(DEFAULT_CLAIM_TIMEOUT)
    }
}

impl JobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim_timeout(claim_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            claim_timeout,
        }
    }

    /// Registers a single job record
    pub async fn register(&self, job: JobExecution, globals: HashMap<String, String>) {
        let mut inner = self.inner.write().await;
        let key = (job.pipeline_execution_id, job.stage.clone(), job.name().to_string());
        inner.index.insert(key, job.id);
        inner.jobs.insert(
            job.id,
            JobRecord {
                execution: job,
                globals,
                claimed_until: None,
            },
        );
    }

    /// Registers every job of a run, carrying the run's globals
    pub async fn register_run(&self, run: &PipelineExecution) {
        for job in run.stages.iter().flat_map(|stage| &stage.jobs) {
            self.register(job.clone(), run.definition.globals.clone())
                .await;
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<JobExecution, StatusError> {
        let inner = self.inner.read().await;
        inner
            .jobs
            .get(&id)
            .map(|record| record.execution.clone())
            .ok_or(StatusError::NotFound(id))
    }

    /// Builds what a runner needs to execute a job
    pub async fn execution_info(&self, id: Uuid) -> Result<JobExecutionInfo, StatusError> {
        let inner = self.inner.read().await;
        let record = inner.jobs.get(&id).ok_or(StatusError::NotFound(id))?;

        Ok(JobExecutionInfo {
            job_id: id,
            pipeline_execution_id: record.execution.pipeline_execution_id,
            stage: record.execution.stage.clone(),
            definition: record.execution.definition.clone(),
            globals: record.globals.clone(),
        })
    }

    /// Claims a job for one runner
    ///
    /// Only a `Pending` job without a live claim can be claimed; `false` means
    /// the job is already taken, running or finished.
    pub async fn claim(&self, id: Uuid) -> Result<bool, StatusError> {
        let mut inner = self.inner.write().await;
        let record = inner.jobs.get_mut(&id).ok_or(StatusError::NotFound(id))?;

        if record.execution.state() != ExecutionState::Pending {
            return Ok(false);
        }

        let now = Instant::now();
        if record.claimed_until.is_some_and(|until| now < until) {
            return Ok(false);
        }

        record.claimed_until = Some(now + self.claim_timeout);
        Ok(true)
    }

    /// Releases the claims on listed jobs that lapsed without a report
    ///
    /// Returns the released jobs; they are `Pending` again and need redelivery.
    pub async fn expire_claims(&self, ids: &[Uuid]) -> Vec<Uuid> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let mut expired = Vec::new();

        for id in ids {
            let Some(record) = inner.jobs.get_mut(id) else {
                continue;
            };
            if record.execution.state() == ExecutionState::Pending
                && record.claimed_until.is_some_and(|until| until <= now)
            {
                record.claimed_until = None;
                expired.push(*id);
            }
        }

        expired
    }

    /// Applies a status report to a job
    ///
    /// Repeating the current state is a no-op; leaving a terminal state is rejected.
    pub async fn report(&self, id: Uuid, update: StatusUpdate) -> Result<Transition, StatusError> {
        let mut inner = self.inner.write().await;
        let record = inner.jobs.get_mut(&id).ok_or(StatusError::NotFound(id))?;

        let transition = record.execution.transition(update.state, update.message)?;
        record.claimed_until = None;
        if let Some(container_id) = update.container_id {
            record.execution.assign_container(container_id);
        }

        Ok(transition)
    }

    /// Outcomes of the jobs a job needs, keyed by name
    ///
    /// A dependency with no record is left out of the map.
    pub async fn dependency_states(&self, id: Uuid) -> Result<DependencyStates, StatusError> {
        let inner = self.inner.read().await;
        let job = &inner.jobs.get(&id).ok_or(StatusError::NotFound(id))?.execution;

        let mut states = DependencyStates::new();
        for name in &job.definition.needs {
            let key = (job.pipeline_execution_id, job.stage.clone(), name.clone());
            if let Some(record) = inner.index.get(&key).and_then(|dep| inner.jobs.get(dep)) {
                states.insert(name.clone(), record.execution.outcome());
            }
        }

        Ok(states)
    }

    /// Whether every listed job is terminal; unknown ids are an error
    pub async fn all_terminal(&self, ids: &[Uuid]) -> Result<bool, StatusError> {
        let inner = self.inner.read().await;
        for id in ids {
            let record = inner.jobs.get(id).ok_or(StatusError::NotFound(*id))?;
            if !record.execution.state().is_terminal() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Current copies of the listed jobs, skipping unknown ids
    pub async fn snapshot(&self, ids: &[Uuid]) -> Vec<JobExecution> {
        let inner = self.inner.read().await;
        ids.iter()
            .filter_map(|id| inner.jobs.get(id))
            .map(|record| record.execution.clone())
            .collect()
    }

    /// Moves every still-pending listed job straight to `Canceled`
    ///
    /// Running jobs are left to finish. Returns how many jobs were canceled.
    pub async fn cancel_pending(&self, ids: &[Uuid], message: &str) -> usize {
        let mut inner = self.inner.write().await;
        let mut canceled = 0;

        for id in ids {
            let Some(record) = inner.jobs.get_mut(id) else {
                continue;
            };
            if record.execution.state() == ExecutionState::Pending
                && record
                    .execution
                    .transition(ExecutionState::Canceled, Some(message.to_string()))
                    .is_ok()
            {
                canceled += 1;
            }
        }

        canceled
    }

    /// Drops the listed jobs
    pub async fn forget(&self, ids: &[Uuid]) {
        let mut inner = self.inner.write().await;
        for id in ids {
            if let Some(record) = inner.jobs.remove(id) {
                let job = record.execution;
                inner
                    .index
                    .remove(&(job.pipeline_execution_id, job.stage, job.definition.name));
            }
        }
    }
}
