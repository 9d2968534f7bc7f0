//! Execution state vocabulary and aggregation rules
//!
//! Jobs are driven explicitly by the runner. Stage state is derived from the
//! states of its jobs and pipeline state from the states of its stages, both
//! with the same precedence: a non-allowed failure beats a cancellation,
//! a cancellation beats success, and anything unfinished is still running.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Status of a job, stage or pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl ExecutionState {
    /// `Success`, `Failed` and `Canceled` admit no further transition
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Success | ExecutionState::Failed | ExecutionState::Canceled
        )
    }

    /// Checks a transition against the monotonic order
    /// `Pending -> Running -> {Success | Failed | Canceled}`
    ///
    /// Repeating the current state is accepted as a no-op. A pending entity may
    /// only be canceled directly; it cannot succeed or fail before it ran.
    pub fn check_transition(self, next: ExecutionState) -> Result<Transition, TransitionError> {
        if self == next {
            return Ok(Transition::Unchanged);
        }

        if self.is_terminal() {
            return Err(TransitionError::FromTerminal {
                from: self,
                to: next,
            });
        }

        match (self, next) {
            (ExecutionState::Running, ExecutionState::Pending) => Err(TransitionError::Backwards {
                from: self,
                to: next,
            }),
            (ExecutionState::Pending, ExecutionState::Success | ExecutionState::Failed) => {
                Err(TransitionError::NotStarted { to: next })
            }
            _ => Ok(Transition::Applied),
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "Pending"),
            ExecutionState::Running => write!(f, "Running"),
            ExecutionState::Success => write!(f, "Success"),
            ExecutionState::Failed => write!(f, "Failed"),
            ExecutionState::Canceled => write!(f, "Canceled"),
        }
    }
}

/// Result of an accepted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed
    Applied,
    /// The entity was already in the requested state
    Unchanged,
}

/// A transition that would break monotonicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot leave terminal state {from} for {to}")]
    FromTerminal {
        from: ExecutionState,
        to: ExecutionState,
    },

    #[error("cannot move backwards from {from} to {to}")]
    Backwards {
        from: ExecutionState,
        to: ExecutionState,
    },

    #[error("cannot report {to} for a job that never ran")]
    NotStarted { to: ExecutionState },
}

/// A job state paired with its failure allowance, the input to stage aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub state: ExecutionState,
    pub allow_failure: bool,
}

impl JobOutcome {
    pub fn new(state: ExecutionState, allow_failure: bool) -> Self {
        Self {
            state,
            allow_failure,
        }
    }

    /// `Failed` without allowance
    pub fn is_hard_failure(&self) -> bool {
        self.state == ExecutionState::Failed && !self.allow_failure
    }

    /// `Success`, or `Failed` with allowance
    pub fn is_satisfied(&self) -> bool {
        match self.state {
            ExecutionState::Success => true,
            ExecutionState::Failed => self.allow_failure,
            _ => false,
        }
    }
}

/// Rolls the outcomes of a stage's jobs up to a stage state
pub fn aggregate_stage(jobs: &[JobOutcome]) -> ExecutionState {
    if jobs.iter().any(JobOutcome::is_hard_failure) {
        ExecutionState::Failed
    } else if jobs.iter().any(|job| job.state == ExecutionState::Canceled) {
        ExecutionState::Canceled
    } else if jobs.iter().all(JobOutcome::is_satisfied) {
        ExecutionState::Success
    } else {
        ExecutionState::Running
    }
}

/// Rolls the states of the stages processed so far up to a pipeline state
///
/// Allowance is per job, so every `Failed` stage counts as a real failure here.
pub fn aggregate_pipeline(stages: &[ExecutionState]) -> ExecutionState {
    if stages.contains(&ExecutionState::Failed) {
        ExecutionState::Failed
    } else if stages.contains(&ExecutionState::Canceled) {
        ExecutionState::Canceled
    } else if stages.iter().all(|state| *state == ExecutionState::Success) {
        ExecutionState::Success
    } else {
        ExecutionState::Running
    }
}

/// Whether a job may start, given the outcomes of the jobs it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyGate {
    /// Every dependency finished and none of them blocks
    Ready,
    /// At least one dependency has not finished yet
    Waiting,
    /// A dependency failed without allowance, was canceled, or is unknown
    Blocked(String),
}

/// Evaluates the dependency gate for a job that needs `needs`
pub fn dependency_gate(needs: &[String], outcomes: &HashMap<String, JobOutcome>) -> DependencyGate {
    let mut waiting = false;

    for name in needs {
        let Some(outcome) = outcomes.get(name) else {
            return DependencyGate::Blocked(format!("dependency '{}' is unknown", name));
        };

        if outcome.is_hard_failure() {
            return DependencyGate::Blocked(format!("dependency '{}' failed", name));
        }

        if outcome.state == ExecutionState::Canceled {
            return DependencyGate::Blocked(format!("dependency '{}' was canceled", name));
        }

        if !outcome.state.is_terminal() {
            waiting = true;
        }
    }

    if waiting {
        DependencyGate::Waiting
    } else {
        DependencyGate::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExecutionState::*;

    fn job(state: ExecutionState) -> JobOutcome {
        JobOutcome::new(state, false)
    }

    fn allowed(state: ExecutionState) -> JobOutcome {
        JobOutcome::new(state, true)
    }

    #[test]
    fn test_terminal_states() {
        assert!(!Pending.is_terminal());
        assert!(!Running.is_terminal());
        assert!(Success.is_terminal());
        assert!(Failed.is_terminal());
        assert!(Canceled.is_terminal());
    }

    #[test]
    fn test_forward_transitions_apply() {
        assert_eq!(Pending.check_transition(Running), Ok(Transition::Applied));
        assert_eq!(Running.check_transition(Success), Ok(Transition::Applied));
        assert_eq!(Running.check_transition(Failed), Ok(Transition::Applied));
        assert_eq!(Pending.check_transition(Canceled), Ok(Transition::Applied));
    }

    #[test]
    fn test_terminal_state_is_never_left() {
        assert!(matches!(
            Success.check_transition(Running),
            Err(TransitionError::FromTerminal { .. })
        ));
        assert!(Failed.check_transition(Success).is_err());
        assert!(Canceled.check_transition(Pending).is_err());
        assert_eq!(Success.check_transition(Success), Ok(Transition::Unchanged));
    }

    #[test]
    fn test_pending_cannot_skip_running() {
        assert_eq!(
            Pending.check_transition(Success),
            Err(TransitionError::NotStarted { to: Success })
        );
        assert_eq!(
            Pending.check_transition(Failed),
            Err(TransitionError::NotStarted { to: Failed })
        );
    }

    #[test]
    fn test_running_cannot_return_to_pending() {
        assert!(matches!(
            Running.check_transition(Pending),
            Err(TransitionError::Backwards { .. })
        ));
    }

    #[test]
    fn test_stage_allowed_failure_counts_as_success() {
        assert_eq!(aggregate_stage(&[job(Success), allowed(Failed)]), Success);
    }

    #[test]
    fn test_stage_hard_failure_fails_stage() {
        assert_eq!(aggregate_stage(&[job(Success), job(Failed)]), Failed);
    }

    #[test]
    fn test_stage_cancellation() {
        assert_eq!(aggregate_stage(&[job(Success), job(Canceled)]), Canceled);
    }

    #[test]
    fn test_stage_failure_beats_cancellation() {
        assert_eq!(aggregate_stage(&[job(Canceled), job(Failed)]), Failed);
        assert_eq!(aggregate_stage(&[job(Canceled), allowed(Failed)]), Canceled);
    }

    #[test]
    fn test_stage_in_flight_is_running() {
        assert_eq!(aggregate_stage(&[job(Success), job(Running)]), Running);
        assert_eq!(aggregate_stage(&[job(Pending)]), Running);
    }

    #[test]
    fn test_pipeline_aggregation() {
        assert_eq!(aggregate_pipeline(&[Success, Success]), Success);
        assert_eq!(aggregate_pipeline(&[Failed, Canceled, Canceled]), Failed);
        assert_eq!(aggregate_pipeline(&[Success, Canceled]), Canceled);
        assert_eq!(aggregate_pipeline(&[Success, Pending]), Running);
        assert_eq!(aggregate_pipeline(&[Running, Pending]), Running);
    }

    #[test]
    fn test_dependency_gate() {
        let needs = vec!["build".to_string(), "lint".to_string()];
        let mut outcomes = HashMap::new();
        outcomes.insert("build".to_string(), job(Success));
        outcomes.insert("lint".to_string(), job(Running));
        assert_eq!(dependency_gate(&needs, &outcomes), DependencyGate::Waiting);

        outcomes.insert("lint".to_string(), allowed(Failed));
        assert_eq!(dependency_gate(&needs, &outcomes), DependencyGate::Ready);

        outcomes.insert("lint".to_string(), job(Failed));
        assert!(matches!(
            dependency_gate(&needs, &outcomes),
            DependencyGate::Blocked(_)
        ));

        outcomes.insert("lint".to_string(), job(Canceled));
        assert!(matches!(
            dependency_gate(&needs, &outcomes),
            DependencyGate::Blocked(_)
        ));
    }

    #[test]
    fn test_dependency_gate_unknown_dependency_blocks() {
        let needs = vec!["ghost".to_string()];
        assert!(matches!(
            dependency_gate(&needs, &HashMap::new()),
            DependencyGate::Blocked(_)
        ));
    }

    #[test]
    fn test_dependency_gate_without_needs_is_ready() {
        assert_eq!(dependency_gate(&[], &HashMap::new()), DependencyGate::Ready);
    }
}
