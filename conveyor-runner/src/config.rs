//! Runner configuration
//!
//! Defines all configurable parameters for the runner including polling
//! intervals, status-report retries and orchestrator connection settings.

use std::time::Duration;

/// Default name of the shared work queue
pub const DEFAULT_QUEUE_NAME: &str = "conveyor-jobs";

/// Runner configuration
///
/// All intervals are configurable to allow tuning for different deployment
/// scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Orchestrator base URL (e.g., "http://localhost:8080")
    pub orchestrator_url: String,

    /// Work queue to claim jobs from
    pub queue_name: String,

    /// How often to poll the orchestrator for new jobs
    pub poll_interval: Duration,

    /// How often a job re-reads the states of the jobs it needs
    pub dependency_poll_interval: Duration,

    /// Attempts per status-channel call before giving up
    pub status_report_attempts: u32,

    /// Pause between two attempts of a status-channel call
    pub status_retry_delay: Duration,

    /// Max parallel jobs the runner can handle
    pub max_parallel_jobs: usize,

    /// Container runtime binary (e.g., "podman")
    pub container_runtime: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String, orchestrator_url: String) -> Self {
        Self {
            runner_id,
            orchestrator_url,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            poll_interval: Duration::from_secs(2),
            dependency_poll_interval: Duration::from_millis(2000),
            status_report_attempts: 3,
            status_retry_delay: Duration::from_millis(500),
            max_parallel_jobs: 1,
            container_runtime: "podman".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - RUNNER_ID (required)
    /// - ORCHESTRATOR_URL (required)
    /// - JOB_QUEUE (optional, default: conveyor-jobs)
    /// - POLL_INTERVAL (optional, seconds, default: 2)
    /// - DEPENDENCY_POLL_INTERVAL_MS (optional, default: 2000)
    /// - STATUS_REPORT_ATTEMPTS (optional, default: 3)
    /// - STATUS_RETRY_DELAY_MS (optional, default: 500)
    /// - MAX_PARALLEL_JOBS (optional, default: 1)
    /// - CONTAINER_RUNTIME (optional, default: podman)
    pub fn from_env() -> anyhow::Result<Self> {
        let runner_id = std::env::var("RUNNER_ID")
            .map_err(|_| anyhow::anyhow!("RUNNER_ID environment variable not set"))?;

        let orchestrator_url = std::env::var("ORCHESTRATOR_URL")
            .map_err(|_| anyhow::anyhow!("ORCHESTRATOR_URL environment variable not set"))?;

        let defaults = Self::new(runner_id, orchestrator_url);

        let queue_name = std::env::var("JOB_QUEUE").unwrap_or(defaults.queue_name.clone());

        let poll_interval = env_parsed::<u64>("POLL_INTERVAL")
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let dependency_poll_interval = env_parsed::<u64>("DEPENDENCY_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.dependency_poll_interval);

        let status_report_attempts =
            env_parsed::<u32>("STATUS_REPORT_ATTEMPTS").unwrap_or(defaults.status_report_attempts);

        let status_retry_delay = env_parsed::<u64>("STATUS_RETRY_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.status_retry_delay);

        let max_parallel_jobs =
            env_parsed::<usize>("MAX_PARALLEL_JOBS").unwrap_or(defaults.max_parallel_jobs);

        let container_runtime =
            std::env::var("CONTAINER_RUNTIME").unwrap_or(defaults.container_runtime.clone());

        Ok(Self {
            queue_name,
            poll_interval,
            dependency_poll_interval,
            status_report_attempts,
            status_retry_delay,
            max_parallel_jobs,
            container_runtime,
            ..defaults
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if self.orchestrator_url.is_empty() {
            anyhow::bail!("orchestrator_url cannot be empty");
        }

        if !self.orchestrator_url.starts_with("http://")
            && !self.orchestrator_url.starts_with("https://")
        {
            anyhow::bail!("orchestrator_url must start with http:// or https://");
        }

        if self.queue_name.trim().is_empty() {
            anyhow::bail!("queue_name cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.dependency_poll_interval.is_zero() {
            anyhow::bail!("dependency_poll_interval must be greater than 0");
        }

        if self.status_report_attempts == 0 {
            anyhow::bail!("status_report_attempts must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.container_runtime.trim().is_empty() {
            anyhow::bail!("container_runtime cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}
