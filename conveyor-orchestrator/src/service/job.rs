//! Job Service
//!
//! Worker-facing job operations: claiming the next job from the work queue
//! and the status channel runners report through.

use conveyor_core::domain::state::{Transition, TransitionError};
use conveyor_core::dto::job::{DependencyStates, JobExecutionInfo, JobStatus, StatusUpdate};
use uuid::Uuid;

use crate::repository::{JobStatusStore, QueueError, StatusError, WorkQueue};

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(Uuid),
    InvalidTransition(TransitionError),
    QueueError(QueueError),
}

impl From<StatusError> for JobError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::NotFound(id) => JobError::NotFound(id),
            StatusError::Transition(err) => JobError::InvalidTransition(err),
        }
    }
}

impl From<QueueError> for JobError {
    fn from(err: QueueError) -> Self {
        JobError::QueueError(err)
    }
}

/// Takes the next runnable job off `queue_name`
///
/// A message is only handed out if its job is `Pending` and unclaimed.
/// Messages for unknown jobs, duplicates of a claimed or running job, and
/// jobs that are already terminal (canceled while queued) are dropped and
/// the next message is tried.
pub async fn claim_next(
    queue: &dyn WorkQueue,
    store: &JobStatusStore,
    queue_name: &str,
) -> Result<Option<JobExecutionInfo>, JobError> {
    while let Some(message) = queue.dequeue(queue_name).await? {
        let Ok(job_id) = Uuid::parse_str(&message) else {
            tracing::warn!("Dropping malformed message from {}: {}", queue_name, message);
            continue;
        };

        match store.claim(job_id).await {
            Ok(true) => return Ok(Some(store.execution_info(job_id).await?)),
            Ok(false) => {
                tracing::debug!("Skipping job {}: claimed, running or finished", job_id);
            }
            Err(_) => tracing::warn!("Dropping message for unknown job {}", job_id),
        }
    }

    Ok(None)
}

/// Applies a runner's status report
pub async fn report_status(
    store: &JobStatusStore,
    job_id: Uuid,
    update: StatusUpdate,
) -> Result<Transition, JobError> {
    let state = update.state;
    let transition = store.report(job_id, update).await?;

    match transition {
        Transition::Applied => tracing::info!("Job {} is now {}", job_id, state),
        Transition::Unchanged => tracing::debug!("Job {} already {}", job_id, state),
    }

    Ok(transition)
}

/// Get the current state of a job
pub async fn job_status(store: &JobStatusStore, job_id: Uuid) -> Result<JobStatus, JobError> {
    let job = store.get(job_id).await?;
    Ok(JobStatus {
        job_id,
        state: job.state(),
    })
}

/// Outcomes of the jobs a job needs
pub async fn dependency_states(
    store: &JobStatusStore,
    job_id: Uuid,
) -> Result<DependencyStates, JobError> {
    Ok(store.dependency_states(job_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryWorkQueue;
    use conveyor_core::domain::definition::{JobDefinition, PipelineDefinition, StageDefinition};
    use conveyor_core::domain::execution::PipelineExecution;
    use conveyor_core::domain::state::ExecutionState;

    async fn fixture() -> (InMemoryWorkQueue, JobStatusStore, PipelineExecution) {
        let queue = InMemoryWorkQueue::new();
        queue.declare("jobs").unwrap();
        let store = JobStatusStore::new();
        let run = PipelineExecution::new(PipelineDefinition::new(
            "ci",
            vec![StageDefinition::new(
                "build",
                vec![
                    JobDefinition::new("compile", "x", vec!["make".to_string()]),
                    JobDefinition::new("lint", "x", vec!["make lint".to_string()]),
                ],
            )],
        ));
        store.register_run(&run).await;
        (queue, store, run)
    }

    #[tokio::test]
    async fn test_claim_next_returns_execution_info() {
        let (queue, store, run) = fixture().await;
        let id = run.stages[0].jobs[0].id;
        queue.enqueue("jobs", id.to_string()).await.unwrap();

        let info = claim_next(&queue, &store, "jobs").await.unwrap().unwrap();
        assert_eq!(info.job_id, id);
        assert_eq!(info.definition.name, "compile");
        assert!(claim_next(&queue, &store, "jobs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_next_skips_terminal_and_unknown_jobs() {
        let (queue, store, run) = fixture().await;
        let ids = run.stages[0].job_ids();
        store.cancel_pending(&ids[..1], "canceled").await;

        queue.enqueue("jobs", "garbage".to_string()).await.unwrap();
        queue
            .enqueue("jobs", Uuid::new_v4().to_string())
            .await
            .unwrap();
        queue.enqueue("jobs", ids[0].to_string()).await.unwrap();
        queue.enqueue("jobs", ids[1].to_string()).await.unwrap();

        let info = claim_next(&queue, &store, "jobs").await.unwrap().unwrap();
        assert_eq!(info.job_id, ids[1]);
        assert_eq!(queue.outstanding("jobs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_claimed_once() {
        let (queue, store, run) = fixture().await;
        let id = run.stages[0].jobs[0].id;
        for _ in 0..3 {
            queue.enqueue("jobs", id.to_string()).await.unwrap();
        }

        assert!(claim_next(&queue, &store, "jobs").await.unwrap().is_some());
        // Claimed, not yet reported
        assert!(claim_next(&queue, &store, "jobs").await.unwrap().is_none());

        queue.enqueue("jobs", id.to_string()).await.unwrap();
        report_status(&store, id, StatusUpdate::new(ExecutionState::Running, None))
            .await
            .unwrap();
        assert!(claim_next(&queue, &store, "jobs").await.unwrap().is_none());
        assert_eq!(queue.outstanding("jobs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_report_status_rejects_leaving_terminal_state() {
        let (_, store, run) = fixture().await;
        let id = run.stages[0].jobs[0].id;

        report_status(&store, id, StatusUpdate::new(ExecutionState::Running, None))
            .await
            .unwrap();
        report_status(&store, id, StatusUpdate::new(ExecutionState::Success, None))
            .await
            .unwrap();

        let result =
            report_status(&store, id, StatusUpdate::new(ExecutionState::Running, None)).await;
        assert!(matches!(result, Err(JobError::InvalidTransition(_))));
        assert_eq!(
            job_status(&store, id).await.unwrap().state,
            ExecutionState::Success
        );
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (_, store, _) = fixture().await;
        assert!(matches!(
            job_status(&store, Uuid::new_v4()).await,
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            dependency_states(&store, Uuid::new_v4()).await,
            Err(JobError::NotFound(_))
        ));
    }
}
