//! Orchestrator configuration
//!
//! Defines the bind address, the shared work queue, the drain-barrier
//! polling interval and how long state is held for workers and clients.

use std::time::Duration;

use crate::repository::run::DEFAULT_RETAINED_RUNS;
use crate::repository::status::DEFAULT_CLAIM_TIMEOUT;

/// Default interval between drain-barrier polls
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default name of the shared work queue
pub const DEFAULT_QUEUE_NAME: &str = "conveyor-jobs";

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP surface binds to (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    /// Name of the work queue every runner claims from
    pub queue_name: String,

    /// How often the dispatcher checks whether a stage has drained
    pub drain_poll_interval: Duration,

    /// How long a claimed job may go without a status report before it is
    /// delivered again
    pub claim_timeout: Duration,

    /// Finished runs kept for inspection
    pub retained_runs: usize,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - JOB_QUEUE (default: conveyor-jobs)
    /// - DRAIN_POLL_INTERVAL_MS (default: 1000)
    /// - CLAIM_TIMEOUT_MS (default: 30000)
    /// - RETAINED_RUNS (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let queue_name = std::env::var("JOB_QUEUE").unwrap_or(defaults.queue_name);

        let drain_poll_interval = std::env::var("DRAIN_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.drain_poll_interval);

        let claim_timeout = std::env::var("CLAIM_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.claim_timeout);

        let retained_runs = std::env::var("RETAINED_RUNS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.retained_runs);

        Self {
            bind_addr,
            queue_name,
            drain_poll_interval,
            claim_timeout,
            retained_runs,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.trim().is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.queue_name.trim().is_empty() {
            anyhow::bail!("queue_name cannot be empty");
        }

        if self.drain_poll_interval.is_zero() {
            anyhow::bail!("drain_poll_interval must be greater than 0");
        }

        if self.claim_timeout.is_zero() {
            anyhow::bail!("claim_timeout must be greater than 0");
        }

        if self.retained_runs == 0 {
            anyhow::bail!("retained_runs must be at least 1");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
            retained_runs: DEFAULT_RETAINED_RUNS,
        }
    }
}
