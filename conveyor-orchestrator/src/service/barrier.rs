//! Stage drain barrier
//!
//! The dispatcher blocks here between stages. The broker offers no push
//! notification for "queue empty", so the baseline implementation polls.
//! Each poll also redelivers jobs whose claim lapsed without a report, so a
//! runner lost between claim and first report cannot stall the stage.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::{JobStatusStore, WorkQueue};
use crate::service::dispatcher::DispatchError;

/// Waits until a stage's work has drained
#[async_trait]
pub trait DrainBarrier: Send + Sync {
    /// Returns once `queue` has no outstanding messages and every job in
    /// `jobs` is terminal, or fails with `Interrupted` when `cancel` fires
    async fn wait(
        &self,
        queue: &str,
        jobs: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError>;
}

/// Fixed-interval polling of the queue depth and the job status store
pub struct PollingDrainBarrier {
    queue: Arc<dyn WorkQueue>,
    store: Arc<JobStatusStore>,
    interval: Duration,
}

impl PollingDrainBarrier {
    pub fn new(queue: Arc<dyn WorkQueue>, store: Arc<JobStatusStore>, interval: Duration) -> Self {
        Self {
            queue,
            store,
            interval,
        }
    }

    async fn drained(&self, queue: &str, jobs: &[Uuid]) -> Result<bool, DispatchError> {
        for id in self.store.expire_claims(jobs).await {
            tracing::warn!("Claim on job {} lapsed without a report, redelivering", id);
            self.queue.enqueue(queue, id.to_string()).await?;
        }

        let outstanding = self.queue.outstanding(queue).await?;
        if outstanding > 0 {
            tracing::trace!("Queue {} still has {} outstanding messages", queue, outstanding);
            return Ok(false);
        }

        self.store
            .all_terminal(jobs)
            .await
            .map_err(|e| DispatchError::Store(e.to_string()))
    }
}

#[async_trait]
impl DrainBarrier for PollingDrainBarrier {
    async fn wait(
        &self,
        queue: &str,
        jobs: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        loop {
            if cancel.is_cancelled() {
                return Err(DispatchError::Interrupted);
            }

            if self.drained(queue, jobs).await? {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(DispatchError::Interrupted),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryWorkQueue;
    use crate::service::job_service;
    use conveyor_core::domain::definition::JobDefinition;
    use conveyor_core::domain::execution::JobExecution;
    use conveyor_core::domain::state::ExecutionState;
    use conveyor_core::dto::job::StatusUpdate;
    use std::collections::HashMap;

    async fn fixture() -> (Arc<InMemoryWorkQueue>, Arc<JobStatusStore>, Uuid) {
        let queue = Arc::new(InMemoryWorkQueue::new());
        queue.declare("jobs").unwrap();
        let store = Arc::new(JobStatusStore::new());
        let job = JobExecution::new(
            Uuid::new_v4(),
            "build",
            JobDefinition::new("compile", "x", vec!["make".to_string()]),
        );
        let id = job.id;
        store.register(job, HashMap::new()).await;
        (queue, store, id)
    }

    #[tokio::test]
    async fn test_waits_for_queue_and_terminal_jobs() {
        let (queue, store, id) = fixture().await;
        queue.enqueue("jobs", id.to_string()).await.unwrap();

        let barrier =
            PollingDrainBarrier::new(queue.clone(), store.clone(), Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let worker = {
            let queue = queue.clone();
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                queue.dequeue("jobs").await.unwrap();
                store
                    .report(id, StatusUpdate::new(ExecutionState::Running, None))
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(30)).await;
                store
                    .report(id, StatusUpdate::new(ExecutionState::Success, None))
                    .await
                    .unwrap();
            })
        };

        barrier.wait("jobs", &[id], &cancel).await.unwrap();
        assert_eq!(queue.outstanding("jobs").await.unwrap(), 0);
        assert_eq!(store.get(id).await.unwrap().state(), ExecutionState::Success);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_claim_is_redelivered() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        queue.declare("jobs").unwrap();
        let store = Arc::new(JobStatusStore::with_claim_timeout(Duration::from_millis(20)));
        let job = JobExecution::new(
            Uuid::new_v4(),
            "build",
            JobDefinition::new("compile", "x", vec!["make".to_string()]),
        );
        let id = job.id;
        store.register(job, HashMap::new()).await;
        queue.enqueue("jobs", id.to_string()).await.unwrap();

        // A runner claims the job and disappears without reporting
        let lost = job_service::claim_next(queue.as_ref(), &store, "jobs")
            .await
            .unwrap();
        assert!(lost.is_some());

        let worker = {
            let queue = queue.clone();
            let store = store.clone();
            tokio::spawn(async move {
                loop {
                    if let Some(info) = job_service::claim_next(queue.as_ref(), &store, "jobs")
                        .await
                        .unwrap()
                    {
                        for state in [ExecutionState::Running, ExecutionState::Success] {
                            store
                                .report(info.job_id, StatusUpdate::new(state, None))
                                .await
                                .unwrap();
                        }
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let barrier =
            PollingDrainBarrier::new(queue.clone(), store.clone(), Duration::from_millis(5));
        tokio::time::timeout(
            Duration::from_secs(2),
            barrier.wait("jobs", &[id], &CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(store.get(id).await.unwrap().state(), ExecutionState::Success);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_queue_with_running_job_does_not_drain() {
        let (queue, store, id) = fixture().await;
        store
            .report(id, StatusUpdate::new(ExecutionState::Running, None))
            .await
            .unwrap();

        let barrier = PollingDrainBarrier::new(queue, store, Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            barrier.wait("jobs", &[id], &cancel),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let (queue, store, id) = fixture().await;
        queue.enqueue("jobs", id.to_string()).await.unwrap();

        let barrier = PollingDrainBarrier::new(queue, store, Duration::from_millis(5));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        assert_eq!(
            barrier.wait("jobs", &[id], &cancel).await,
            Err(DispatchError::Interrupted)
        );
    }

    #[tokio::test]
    async fn test_missing_queue_is_fatal() {
        let (_, store, id) = fixture().await;
        let barrier = PollingDrainBarrier::new(
            Arc::new(InMemoryWorkQueue::new()),
            store,
            Duration::from_millis(5),
        );

        assert_eq!(
            barrier
                .wait("jobs", &[id], &CancellationToken::new())
                .await,
            Err(DispatchError::QueueNotFound("jobs".to_string()))
        );
    }
}
