//! Status repository
//!
//! The runner's side of the status channel: reporting job transitions and
//! reading the outcomes of the jobs a job needs. Every call is retried per
//! the configured policy before the error is surfaced.

use anyhow::{Context, Result};
use async_trait::async_trait;
use conveyor_client::{ClientError, OrchestratorClient};
use conveyor_core::dto::job::{DependencyStates, StatusUpdate};
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::RetryPolicy;

/// Repository trait for the status channel
#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// Reports a state transition of a job
    ///
    /// # Arguments
    /// * `job_id` - The ID of the job to update
    /// * `update` - The new state, with an optional message and container handle
    async fn report(&self, job_id: Uuid, update: &StatusUpdate) -> Result<()>;

    /// Fetches the outcomes of the jobs `job_id` needs, keyed by job name
    async fn dependency_states(&self, job_id: Uuid) -> Result<DependencyStates>;
}

/// Whether the orchestrator refused a report, as opposed to not being reached
///
/// A refused transition (for example a job canceled while it sat in the
/// queue) will not succeed on any later attempt.
pub fn is_rejection(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ClientError>()
        .is_some_and(ClientError::is_client_error)
}

/// HTTP implementation of StatusRepository
pub struct HttpStatusRepository {
    client: Arc<OrchestratorClient>,
    retry: RetryPolicy,
}

impl HttpStatusRepository {
    pub fn new(client: Arc<OrchestratorClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl StatusRepository for HttpStatusRepository {
    async fn report(&self, job_id: Uuid, update: &StatusUpdate) -> Result<()> {
        self.retry
            .run("Status report", || self.client.report_job_status(job_id, update))
            .await
            .with_context(|| format!("Failed to report {} for job {}", update.state, job_id))
    }

    async fn dependency_states(&self, job_id: Uuid) -> Result<DependencyStates> {
        self.retry
            .run("Dependency lookup", || self.client.get_dependency_states(job_id))
            .await
            .with_context(|| format!("Failed to fetch dependency states for job {}", job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_survives_context() {
        let refused: anyhow::Error = ClientError::api_error(409, "cannot leave terminal state").into();
        assert!(is_rejection(&refused.context("Failed to report Running")));

        let unavailable: anyhow::Error = ClientError::api_error(503, "unavailable").into();
        assert!(!is_rejection(&unavailable));

        assert!(!is_rejection(&anyhow::anyhow!("connection refused")));
    }
}
