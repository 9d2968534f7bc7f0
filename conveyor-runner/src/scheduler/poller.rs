//! Job poller
//!
//! Claims jobs from the work queue and runs each one in its own task. A
//! semaphore bounds how many jobs run at once; claiming stops while every
//! permit is taken so unclaimed jobs stay available to other runners.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::repository::JobRepository;
use crate::service::JobRunner;

/// Job poller that continuously claims and executes jobs
pub struct JobPoller {
    config: Config,
    jobs: Arc<dyn JobRepository>,
    runner: Arc<JobRunner>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl JobPoller {
    /// Creates a new job poller
    pub fn new(
        config: Config,
        jobs: Arc<dyn JobRepository>,
        runner: Arc<JobRunner>,
        shutdown: CancellationToken,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            jobs,
            runner,
            semaphore,
            shutdown,
        }
    }

    /// Starts the polling loop; returns once shutdown was requested and
    /// every running job finished
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting job poller (queue: {}, interval: {:?}, parallel jobs: {})",
            self.config.queue_name, self.config.poll_interval, self.config.max_parallel_jobs
        );

        let mut interval = time::interval(self.config.poll_interval);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            // Reap finished tasks so the set does not grow unbounded
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    warn!("Job task panicked: {}", e);
                }
            }

            match self.poll_once(&mut tasks).await {
                Ok(claimed) => {
                    if claimed > 0 {
                        info!("Claimed {} job(s) this cycle", claimed);
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }
        }

        if !tasks.is_empty() {
            info!("Waiting for {} running job(s) to finish", tasks.len());
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Job task panicked: {}", e);
            }
        }

        info!("Job poller stopped");
        Ok(())
    }

    /// Claims jobs while a permit is free and spawns a task for each
    async fn poll_once(&self, tasks: &mut JoinSet<()>) -> Result<usize> {
        let mut claimed = 0;

        loop {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                debug!("Max parallel jobs reached, not claiming");
                break;
            };

            let Some(info) = self.jobs.claim_next().await? else {
                debug!("No jobs available");
                break;
            };

            info!(
                "Claimed job {} ({}/{})",
                info.job_id, info.stage, info.definition.name
            );
            claimed += 1;

            let runner = Arc::clone(&self.runner);
            let cancel = self.shutdown.child_token();
            tasks.spawn(async move {
                let _permit = permit;
                runner.run(&info, &cancel).await;
            });
        }

        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::fake::FakeRuntime;
    use crate::repository::StatusRepository;
    use async_trait::async_trait;
    use conveyor_core::domain::definition::JobDefinition;
    use conveyor_core::dto::job::{DependencyStates, JobExecutionInfo, StatusUpdate};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    struct FakeJobs {
        pending: Mutex<Vec<JobExecutionInfo>>,
    }

    impl FakeJobs {
        fn with(count: usize) -> Self {
            let pending = (0..count)
                .map(|i| JobExecutionInfo {
                    job_id: Uuid::new_v4(),
                    pipeline_execution_id: Uuid::new_v4(),
                    stage: "build".to_string(),
                    definition: JobDefinition::new(format!("job-{}", i), "x", vec!["true".to_string()]),
                    globals: HashMap::new(),
                })
                .collect();
            Self {
                pending: Mutex::new(pending),
            }
        }

        fn remaining(&self) -> usize {
            self.pending.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobRepository for FakeJobs {
        async fn claim_next(&self) -> Result<Option<JobExecutionInfo>> {
            Ok(self.pending.lock().unwrap().pop())
        }
    }

    #[derive(Default)]
    struct CountingStatuses {
        terminal: Mutex<usize>,
    }

    #[async_trait]
    impl StatusRepository for CountingStatuses {
        async fn report(&self, _job_id: Uuid, update: &StatusUpdate) -> Result<()> {
            if update.state.is_terminal() {
                *self.terminal.lock().unwrap() += 1;
            }
            Ok(())
        }

        async fn dependency_states(&self, _job_id: Uuid) -> Result<DependencyStates> {
            Ok(DependencyStates::new())
        }
    }

    fn poller(jobs: Arc<FakeJobs>, statuses: Arc<CountingStatuses>, parallel: usize) -> JobPoller {
        let mut config = Config::new("runner-1".to_string(), "http://localhost:8080".to_string());
        config.poll_interval = Duration::from_millis(5);
        config.max_parallel_jobs = parallel;

        let runner = Arc::new(JobRunner::new(
            statuses,
            Arc::new(FakeRuntime::exiting_with(0)),
            Duration::from_millis(5),
        ));
        JobPoller::new(config, jobs, runner, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_claims_no_more_than_free_permits() {
        let jobs = Arc::new(FakeJobs::with(3));
        let poller = poller(jobs.clone(), Arc::new(CountingStatuses::default()), 2);

        let mut tasks = JoinSet::new();
        let claimed = poller.poll_once(&mut tasks).await.unwrap();

        assert_eq!(claimed, 2);
        assert_eq!(jobs.remaining(), 1);
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_runs_every_job_then_stops_on_shutdown() {
        let jobs = Arc::new(FakeJobs::with(4));
        let statuses = Arc::new(CountingStatuses::default());
        let poller = Arc::new(poller(jobs.clone(), statuses.clone(), 2));

        let handle = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.run().await })
        };

        for _ in 0..200 {
            if *statuses.terminal.lock().unwrap() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        poller.shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(jobs.remaining(), 0);
        assert_eq!(*statuses.terminal.lock().unwrap(), 4);
    }
}
