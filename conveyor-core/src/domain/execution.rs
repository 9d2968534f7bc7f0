//! Execution records
//!
//! Runtime counterparts of the definitions. A `PipelineExecution` is owned by
//! the orchestrator's coordinator, which is the only writer of stage and
//! pipeline state. Job records are written by the runner executing them and
//! mirrored into the orchestrator through status reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::definition::{JobDefinition, PipelineDefinition, StageDefinition};
use crate::domain::state::{
    ExecutionState, JobOutcome, Transition, TransitionError, aggregate_pipeline, aggregate_stage,
};

/// Execution record of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub pipeline_execution_id: Uuid,
    pub stage: String,
    pub definition: JobDefinition,
    state: ExecutionState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque runtime handle, set once the container exists
    container_id: Option<String>,
    /// Last diagnostic attached to a transition
    pub message: Option<String>,
}

impl JobExecution {
    pub fn new(pipeline_execution_id: Uuid, stage: &str, definition: JobDefinition) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_execution_id,
            stage: stage.to_string(),
            definition,
            state: ExecutionState::Pending,
            started_at: None,
            completed_at: None,
            container_id: None,
            message: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn outcome(&self) -> JobOutcome {
        JobOutcome::new(self.state, self.definition.allow_failure)
    }

    /// Moves the job to `next`, stamping start and completion times
    ///
    /// Terminal states are never left; repeating the current state changes nothing.
    pub fn transition(
        &mut self,
        next: ExecutionState,
        message: Option<String>,
    ) -> Result<Transition, TransitionError> {
        let transition = self.state.check_transition(next)?;

        if transition == Transition::Applied {
            let now = Utc::now();
            if next == ExecutionState::Running {
                self.started_at = Some(now);
            }
            if next.is_terminal() {
                self.completed_at = Some(now);
            }
            self.state = next;
            if message.is_some() {
                self.message = message;
            }
        }

        Ok(transition)
    }

    /// Records the container handle; returns `false` if one was already set
    pub fn assign_container(&mut self, handle: impl Into<String>) -> bool {
        if self.container_id.is_some() {
            return false;
        }
        self.container_id = Some(handle.into());
        true
    }
}

/// Execution record of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecution {
    pub name: String,
    state: ExecutionState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobExecution>,
}

impl StageExecution {
    pub fn new(pipeline_execution_id: Uuid, definition: &StageDefinition) -> Self {
        let jobs = definition
            .jobs
            .iter()
            .map(|job| JobExecution::new(pipeline_execution_id, &definition.name, job.clone()))
            .collect();

        Self {
            name: definition.name.clone(),
            state: ExecutionState::Pending,
            started_at: None,
            completed_at: None,
            jobs,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn job_ids(&self) -> Vec<Uuid> {
        self.jobs.iter().map(|job| job.id).collect()
    }

    /// Marks the stage as running; only valid from `Pending`
    pub fn start(&mut self) {
        if self.state == ExecutionState::Pending {
            self.state = ExecutionState::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Replaces the job records with fresher copies reported by runners
    pub fn refresh_jobs(&mut self, jobs: Vec<JobExecution>) {
        for fresh in jobs {
            if let Some(job) = self.jobs.iter_mut().find(|job| job.id == fresh.id) {
                *job = fresh;
            }
        }
    }

    /// Recomputes the stage state from its jobs
    ///
    /// A terminal stage keeps its state.
    pub fn recompute_state(&mut self) -> ExecutionState {
        if self.state.is_terminal() {
            return self.state;
        }

        let outcomes: Vec<JobOutcome> = self.jobs.iter().map(JobExecution::outcome).collect();
        let state = aggregate_stage(&outcomes);

        // A stage that never started stays pending until the dispatcher touches it.
        if state == ExecutionState::Running && self.state == ExecutionState::Pending {
            return self.state;
        }

        self.state = state;
        if state.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.state
    }

    /// Settles an aborted stage as `Canceled` regardless of jobs still running
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.state = ExecutionState::Canceled;
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Execution record of a whole pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub definition: PipelineDefinition,
    state: ExecutionState,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub stages: Vec<StageExecution>,
    /// Diagnostics that ended the run (validation or infrastructure errors)
    pub errors: Vec<String>,
}

impl PipelineExecution {
    /// Creates a pending run with one pending stage record per stage
    pub fn new(definition: PipelineDefinition) -> Self {
        let id = Uuid::new_v4();
        let stages = definition
            .stages
            .iter()
            .map(|stage| StageExecution::new(id, stage))
            .collect();

        Self {
            id,
            definition,
            state: ExecutionState::Pending,
            started_at: None,
            updated_at: Utc::now(),
            stages,
            errors: Vec::new(),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn start(&mut self) {
        if self.state == ExecutionState::Pending {
            let now = Utc::now();
            self.state = ExecutionState::Running;
            self.started_at = Some(now);
            self.updated_at = now;
        }
    }

    /// Recomputes the pipeline state from the stages processed so far
    ///
    /// A failure settles the run immediately. A cancellation only settles it
    /// once every stage has settled, since later stages still run.
    pub fn recompute_state(&mut self) -> ExecutionState {
        if self.state.is_terminal() {
            return self.state;
        }

        let states: Vec<ExecutionState> = self.stages.iter().map(StageExecution::state).collect();
        let mut state = aggregate_pipeline(&states);
        if state == ExecutionState::Canceled && states.iter().any(|s| !s.is_terminal()) {
            state = ExecutionState::Running;
        }

        self.state = state;
        self.updated_at = Utc::now();
        self.state
    }

    /// Ends the run with `state`, attaching a diagnostic
    pub fn abort(&mut self, state: ExecutionState, diagnostic: impl Into<String>) {
        self.errors.push(diagnostic.into());
        if !self.state.is_terminal() {
            self.state = state;
        }
        self.updated_at = Utc::now();
    }

    /// Ends a run whose definition did not validate; no work is ever dispatched
    pub fn reject(&mut self, errors: Vec<String>) {
        self.errors.extend(errors);
        for stage in &mut self.stages {
            for job in &mut stage.jobs {
                let _ = job.transition(ExecutionState::Canceled, None);
            }
            stage.abort();
        }
        if !self.state.is_terminal() {
            self.state = ExecutionState::Failed;
        }
        self.updated_at = Utc::now();
    }

    pub fn stage(&self, name: &str) -> Option<&StageExecution> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn job(&self, stage: &str, name: &str) -> Option<&JobExecution> {
        self.stage(stage)?.jobs.iter().find(|job| job.name() == name)
    }
}
