//! Job DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::definition::JobDefinition;
use crate::domain::execution::JobExecution;
use crate::domain::state::{ExecutionState, JobOutcome};

/// Everything a runner needs to execute a claimed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecutionInfo {
    pub job_id: Uuid,
    pub pipeline_execution_id: Uuid,
    pub stage: String,
    pub definition: JobDefinition,
    /// Pipeline globals, injected into the job container as environment
    pub globals: HashMap<String, String>,
}

impl JobExecutionInfo {
    /// A fresh `Pending` record for the claimed job, keeping its id
    pub fn to_execution(&self) -> JobExecution {
        let mut job = JobExecution::new(
            self.pipeline_execution_id,
            &self.stage,
            self.definition.clone(),
        );
        job.id = self.job_id;
        job
    }
}

/// Job status update from runner to orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: ExecutionState,
    pub message: Option<String>,
    pub container_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StatusUpdate {
    pub fn new(state: ExecutionState, message: Option<String>) -> Self {
        Self {
            state,
            message,
            container_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_container(mut self, container_id: Option<String>) -> Self {
        self.container_id = container_id;
        self
    }
}

/// Current state of a job as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: ExecutionState,
}

/// Outcomes of the jobs named in a job's `needs`, keyed by job name
pub type DependencyStates = HashMap<String, JobOutcome>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_execution_keeps_identity() {
        let info = JobExecutionInfo {
            job_id: Uuid::new_v4(),
            pipeline_execution_id: Uuid::new_v4(),
            stage: "build".to_string(),
            definition: JobDefinition::new("compile", "x", vec!["make".to_string()]),
            globals: HashMap::new(),
        };

        let job = info.to_execution();
        assert_eq!(job.id, info.job_id);
        assert_eq!(job.pipeline_execution_id, info.pipeline_execution_id);
        assert_eq!(job.stage, "build");
        assert_eq!(job.state(), ExecutionState::Pending);
    }

    #[test]
    fn test_claim_response_may_be_null() {
        let claimed: Option<JobExecutionInfo> = serde_json::from_str("null").unwrap();
        assert!(claimed.is_none());
    }
}
