//! Pipeline Run Repository
//!
//! Keeps the latest snapshot of every pipeline run, together with the token
//! used to cancel it. Nothing is persisted; only the most recent finished
//! runs are retained.

use conveyor_core::domain::execution::PipelineExecution;
use conveyor_core::dto::pipeline::PipelineRunSummary;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Finished runs kept for inspection by default
pub const DEFAULT_RETAINED_RUNS: usize = 100;

struct RunEntry {
    snapshot: PipelineExecution,
    cancel: CancellationToken,
}

pub struct PipelineRunRepository {
    runs: RwLock<HashMap<Uuid, RunEntry>>,
    retained: usize,
}

impl Default for PipelineRunRepository {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_RUNS)
    }
}

impl PipelineRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `retained` finished runs; runs in flight are never dropped
    pub fn with_retention(retained: usize) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            retained,
        }
    }

    /// Tracks a new run and returns its cancellation token
    pub async fn insert(&self, run: &PipelineExecution) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.runs.write().await.insert(
            run.id,
            RunEntry {
                snapshot: run.clone(),
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Replaces the stored snapshot of a tracked run
    pub async fn save(&self, run: &PipelineExecution) {
        if let Some(entry) = self.runs.write().await.get_mut(&run.id) {
            entry.snapshot = run.clone();
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<PipelineExecution> {
        self.runs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Summaries of all tracked runs, newest first
    pub async fn list(&self) -> Vec<PipelineRunSummary> {
        let runs = self.runs.read().await;
        let mut snapshots: Vec<&PipelineExecution> =
            runs.values().map(|entry| &entry.snapshot).collect();
        snapshots.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        snapshots.into_iter().map(PipelineRunSummary::from).collect()
    }

    /// Drops the oldest finished runs beyond the retention limit and returns them
    pub async fn evict_finished(&self) -> Vec<PipelineExecution> {
        let mut runs = self.runs.write().await;

        let mut finished: Vec<_> = runs
            .values()
            .filter(|entry| entry.snapshot.state().is_terminal())
            .map(|entry| (entry.snapshot.updated_at, entry.snapshot.id))
            .collect();
        if finished.len() <= self.retained {
            return Vec::new();
        }

        finished.sort();
        let excess = finished.len() - self.retained;
        finished
            .into_iter()
            .take(excess)
            .filter_map(|(_, id)| runs.remove(&id))
            .map(|entry| entry.snapshot)
            .collect()
    }

    /// Signals cooperative cancellation; returns `false` for an unknown run
    pub async fn cancel(&self, id: Uuid) -> bool {
        match self.runs.read().await.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::domain::definition::PipelineDefinition;
    use conveyor_core::domain::state::ExecutionState;

    #[tokio::test]
    async fn test_save_replaces_snapshot() {
        let repo = PipelineRunRepository::new();
        let mut run = PipelineExecution::new(PipelineDefinition::new("ci", vec![]));
        repo.insert(&run).await;

        run.start();
        repo.save(&run).await;

        let stored = repo.get(run.id).await.unwrap();
        assert_eq!(stored.state(), ExecutionState::Running);
        assert_eq!(repo.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_ignores_untracked_run() {
        let repo = PipelineRunRepository::new();
        let run = PipelineExecution::new(PipelineDefinition::new("ci", vec![]));
        repo.save(&run).await;
        assert!(repo.get(run.id).await.is_none());
    }

    #[tokio::test]
    async fn test_evicts_oldest_finished_runs() {
        let repo = PipelineRunRepository::with_retention(1);

        let mut older = PipelineExecution::new(PipelineDefinition::new("ci", vec![]));
        let mut newer = PipelineExecution::new(PipelineDefinition::new("ci", vec![]));
        let mut running = PipelineExecution::new(PipelineDefinition::new("ci", vec![]));
        for run in [&older, &newer, &running] {
            repo.insert(run).await;
        }

        older.reject(vec!["Pipeline name is required".to_string()]);
        repo.save(&older).await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        newer.reject(vec!["Pipeline name is required".to_string()]);
        repo.save(&newer).await;
        running.start();
        repo.save(&running).await;

        let evicted = repo.evict_finished().await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, older.id);
        assert!(repo.get(older.id).await.is_none());
        assert!(repo.get(newer.id).await.is_some());
        assert!(repo.get(running.id).await.is_some());
        assert!(repo.evict_finished().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_trips_token() {
        let repo = PipelineRunRepository::new();
        let run = PipelineExecution::new(PipelineDefinition::new("ci", vec![]));
        let token = repo.insert(&run).await;

        assert!(!token.is_cancelled());
        assert!(repo.cancel(run.id).await);
        assert!(token.is_cancelled());
        assert!(!repo.cancel(Uuid::new_v4()).await);
    }
}
