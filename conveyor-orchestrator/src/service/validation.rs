//! Pipeline Validation
//!
//! Semantic checks over a parsed pipeline definition. Every problem found is
//! accumulated so a rejected run names all offending stages and jobs at once.

use conveyor_core::domain::definition::{JobDefinition, PipelineDefinition, StageDefinition};
use std::collections::{HashMap, HashSet, VecDeque};

/// Outcome of validating a pipeline definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    /// Human-readable errors, in the order they were found
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(errors) => errors,
        }
    }
}

/// Validates a pipeline definition
///
/// Checks, in order: the pipeline name, the presence of stages, stage names,
/// job fields and name uniqueness, `needs` resolution, and dependency cycles
/// within each stage.
pub fn validate(definition: &PipelineDefinition) -> ValidationResult {
    let mut errors = Vec::new();

    if definition.name.trim().is_empty() {
        errors.push("Pipeline name is required".to_string());
    }

    if definition.stages.is_empty() {
        errors.push("Pipeline must declare at least one stage".to_string());
    }

    let mut stage_names = HashSet::new();
    let mut reported_stages = HashSet::new();

    for stage in &definition.stages {
        if stage.name.trim().is_empty() {
            errors.push("Stage name is required".to_string());
        } else if !stage_names.insert(stage.name.as_str())
            && reported_stages.insert(stage.name.as_str())
        {
            errors.push(format!("Duplicate stage name found: {}", stage.name));
        }

        validate_stage(definition, stage, &mut errors);
    }

    if errors.is_empty() {
        ValidationResult::Valid
    } else {
        ValidationResult::Invalid(errors)
    }
}

fn validate_stage(definition: &PipelineDefinition, stage: &StageDefinition, errors: &mut Vec<String>) {
    if stage.jobs.is_empty() {
        errors.push(format!("Stage {} must contain at least one job", stage.name));
        return;
    }

    let mut job_names = HashSet::new();
    let mut reported_jobs = HashSet::new();

    for job in &stage.jobs {
        validate_job_fields(stage, job, errors);

        if !job.name.trim().is_empty()
            && !job_names.insert(job.name.as_str())
            && reported_jobs.insert(job.name.as_str())
        {
            errors.push(format!("Duplicate job name found: {}", job.name));
        }
    }

    for job in &stage.jobs {
        for need in &job.needs {
            if job_names.contains(need.as_str()) {
                continue;
            }

            let elsewhere = definition
                .stages
                .iter()
                .filter(|other| other.name != stage.name)
                .find(|other| other.job(need).is_some());

            match elsewhere {
                Some(other) => errors.push(format!(
                    "Job {} in stage {} needs {} from stage {}; dependencies must stay within a stage",
                    job.name, stage.name, need, other.name
                )),
                None => errors.push(format!(
                    "Job {} in stage {} needs unknown job {}",
                    job.name, stage.name, need
                )),
            }
        }
    }

    if has_cycle(&stage.jobs) {
        errors.push(format!("Cyclic dependencies detected in stage {}", stage.name));
    }
}

fn validate_job_fields(stage: &StageDefinition, job: &JobDefinition, errors: &mut Vec<String>) {
    if job.name.trim().is_empty() {
        errors.push(format!("Job name is required in stage {}", stage.name));
        return;
    }

    if job.image.trim().is_empty() {
        errors.push(format!(
            "Job {} in stage {} must declare an image",
            job.name, stage.name
        ));
    }

    if job.script.iter().all(|command| command.trim().is_empty()) {
        errors.push(format!(
            "Job {} in stage {} must declare at least one script command",
            job.name, stage.name
        ));
    }
}

// =============================================================================
// Dependency graph
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Edges `job -> needed job` over in-stage names; unresolved needs are dropped
fn needs_graph(jobs: &[JobDefinition]) -> Vec<Vec<usize>> {
    let mut indices: HashMap<&str, usize> = HashMap::new();
    for (i, job) in jobs.iter().enumerate() {
        indices.entry(job.name.as_str()).or_insert(i);
    }

    jobs.iter()
        .map(|job| {
            job.needs
                .iter()
                .filter_map(|need| indices.get(need.as_str()).copied())
                .collect()
        })
        .collect()
}

/// Three-color depth-first search; a back-edge to an in-progress node is a cycle
fn has_cycle(jobs: &[JobDefinition]) -> bool {
    let graph = needs_graph(jobs);
    let mut marks = vec![Mark::Unvisited; jobs.len()];

    (0..jobs.len()).any(|start| marks[start] == Mark::Unvisited && visit(start, &graph, &mut marks))
}

fn visit(node: usize, graph: &[Vec<usize>], marks: &mut [Mark]) -> bool {
    marks[node] = Mark::InProgress;

    for &next in &graph[node] {
        match marks[next] {
            Mark::InProgress => return true,
            Mark::Unvisited => {
                if visit(next, graph, marks) {
                    return true;
                }
            }
            Mark::Done => {}
        }
    }

    marks[node] = Mark::Done;
    false
}

/// Dependency-first order of a stage's jobs, as indices into `jobs`
///
/// Kahn's algorithm with ties broken by declared order. Jobs caught in a cycle
/// are appended at the end in declared order, so every job appears once.
pub fn topological_order(jobs: &[&JobDefinition]) -> Vec<usize> {
    let mut indices: HashMap<&str, usize> = HashMap::new();
    for (i, job) in jobs.iter().enumerate() {
        indices.entry(job.name.as_str()).or_insert(i);
    }

    let mut in_degree = vec![0usize; jobs.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); jobs.len()];
    for (i, job) in jobs.iter().enumerate() {
        for need in &job.needs {
            if let Some(&dep) = indices.get(need.as_str()) {
                in_degree[i] += 1;
                dependents[dep].push(i);
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..jobs.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(jobs.len());

    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() < jobs.len() {
        let placed: HashSet<usize> = order.iter().copied().collect();
        order.extend((0..jobs.len()).filter(|i| !placed.contains(i)));
    }

    order
}
