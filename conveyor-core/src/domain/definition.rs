//! Pipeline definition types
//!
//! Definitions arrive already parsed. They are never mutated after a run
//! starts; execution records keep their own copy of the job they describe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single unit of work: one container invocation running a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    /// Unique within its stage
    pub name: String,
    /// Container image reference
    pub image: String,
    /// Shell commands, run in order
    pub script: Vec<String>,
    /// Names of jobs in the same stage that must finish first
    #[serde(default)]
    pub needs: Vec<String>,
    /// A failure of this job does not fail its stage
    #[serde(default)]
    pub allow_failure: bool,
}

impl JobDefinition {
    /// Creates a job with no dependencies that is not allowed to fail
    pub fn new(name: impl Into<String>, image: impl Into<String>, script: Vec<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            script,
            needs: Vec::new(),
            allow_failure: false,
        }
    }

    pub fn with_needs(mut self, needs: &[&str]) -> Self {
        self.needs = needs.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn allowing_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }
}

/// An ordered group of jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub jobs: Vec<JobDefinition>,
}

impl StageDefinition {
    pub fn new(name: impl Into<String>, jobs: Vec<JobDefinition>) -> Self {
        Self {
            name: name.into(),
            jobs,
        }
    }

    /// Looks up a job of this stage by name
    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// A complete pipeline
///
/// Stage order is execution order; stages are a sequence, not a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<StageDefinition>,
    #[serde(default)]
    pub globals: HashMap<String, String>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>, stages: Vec<StageDefinition>) -> Self {
        Self {
            name: name.into(),
            stages,
            globals: HashMap::new(),
        }
    }

    /// Total number of jobs across all stages
    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.jobs.len()).sum()
    }
}
