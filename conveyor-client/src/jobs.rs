//! Job-related API endpoints used by runners

use crate::OrchestratorClient;
use crate::error::Result;
use conveyor_core::dto::job::{DependencyStates, JobExecutionInfo, JobStatus, StatusUpdate};
use conveyor_core::dto::queue::ClaimJob;
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Work Queue
    // =============================================================================

    /// Claim the next runnable job from a queue
    ///
    /// # Arguments
    /// * `queue` - Name of the work queue
    /// * `runner_id` - The ID of the runner claiming the job
    ///
    /// # Returns
    /// Information needed to execute the job, or `None` when the queue is empty
    pub async fn claim_job(&self, queue: &str, runner_id: &str) -> Result<Option<JobExecutionInfo>> {
        let url = format!("{}/api/queue/{}/claim", self.base_url, queue);
        let response = self
            .client
            .post(&url)
            .json(&ClaimJob {
                runner_id: runner_id.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Status Channel
    // =============================================================================

    /// Report a state transition of a job
    ///
    /// # Arguments
    /// * `job_id` - The ID of the job to update
    /// * `update` - The new state, with an optional message and container handle
    pub async fn report_job_status(&self, job_id: Uuid, update: &StatusUpdate) -> Result<()> {
        let url = format!("{}/api/jobs/{}/status", self.base_url, job_id);
        let response = self.client.put(&url).json(update).send().await?;

        self.handle_empty_response(response).await
    }

    /// Get the current state of a job
    pub async fn get_job_status(&self, job_id: Uuid) -> Result<JobStatus> {
        let url = format!("{}/api/jobs/{}/status", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the outcomes of the jobs a job needs, keyed by job name
    pub async fn get_dependency_states(&self, job_id: Uuid) -> Result<DependencyStates> {
        let url = format!("{}/api/jobs/{}/dependencies", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
