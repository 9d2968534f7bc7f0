//! Jobs repository
//!
//! Claims work from the orchestrator's queue on behalf of this runner.

use anyhow::{Context, Result};
use async_trait::async_trait;
use conveyor_client::OrchestratorClient;
use conveyor_core::dto::job::JobExecutionInfo;
use std::sync::Arc;

/// Repository trait for claiming jobs
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Claims the next runnable job, or `None` when the queue is empty
    async fn claim_next(&self) -> Result<Option<JobExecutionInfo>>;
}

/// HTTP implementation of JobRepository
pub struct HttpJobRepository {
    client: Arc<OrchestratorClient>,
    queue_name: String,
    runner_id: String,
}

impl HttpJobRepository {
    /// Creates a new HTTP job repository
    ///
    /// # Arguments
    /// * `client` - Orchestrator client
    /// * `queue_name` - Work queue to claim from
    /// * `runner_id` - Unique identifier for this runner
    pub fn new(client: Arc<OrchestratorClient>, queue_name: String, runner_id: String) -> Self {
        Self {
            client,
            queue_name,
            runner_id,
        }
    }
}

#[async_trait]
impl JobRepository for HttpJobRepository {
    async fn claim_next(&self) -> Result<Option<JobExecutionInfo>> {
        self.client
            .claim_job(&self.queue_name, &self.runner_id)
            .await
            .with_context(|| format!("Failed to claim a job from queue {}", self.queue_name))
    }
}
