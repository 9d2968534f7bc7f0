//! Pipeline run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::PipelineExecution;
use crate::domain::state::ExecutionState;

/// Lightweight view of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunSummary {
    pub id: Uuid,
    pub name: String,
    pub state: ExecutionState,
    pub errors: Vec<String>,
}

impl From<&PipelineExecution> for PipelineRunSummary {
    fn from(run: &PipelineExecution) -> Self {
        Self {
            id: run.id,
            name: run.definition.name.clone(),
            state: run.state(),
            errors: run.errors.clone(),
        }
    }
}
