//! Conveyor Runner
//!
//! A stateless worker that executes pipeline jobs in containers.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: HTTP communication with orchestrator (work queue, status channel)
//! - Services: Job execution (dependency wait, container lifecycle, status reports)
//! - Scheduler: Job polling and lifecycle management
//!
//! The runner claims jobs from the orchestrator's work queue, runs each one
//! in a fresh container and reports every state transition back.

mod config;
mod container;
mod podman;
mod repository;
mod scheduler;
mod service;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::container::ContainerRuntime;
use crate::podman::PodmanRuntime;
use crate::repository::{HttpJobRepository, HttpStatusRepository, JobRepository, RetryPolicy};
use crate::scheduler::JobPoller;
use crate::service::JobRunner;
use conveyor_client::OrchestratorClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Conveyor Runner");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, orchestrator_url={}, queue={}",
        config.runner_id, config.orchestrator_url, config.queue_name
    );

    podman::check_runtime_available(&config.container_runtime)?;

    // Initialize orchestrator client
    let client = Arc::new(OrchestratorClient::new(config.orchestrator_url.clone()));
    wait_for_orchestrator(&client).await?;
    info!("Orchestrator is reachable");

    // Initialize repositories and services
    let retry = RetryPolicy::new(config.status_report_attempts, config.status_retry_delay);
    let statuses = Arc::new(HttpStatusRepository::new(Arc::clone(&client), retry));
    let jobs: Arc<dyn JobRepository> = Arc::new(HttpJobRepository::new(
        Arc::clone(&client),
        config.queue_name.clone(),
        config.runner_id.clone(),
    ));
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(PodmanRuntime::new(config.container_runtime.clone()));
    let runner = Arc::new(JobRunner::new(
        statuses,
        runtime,
        config.dependency_poll_interval,
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let poller = JobPoller::new(config, jobs, runner, shutdown);

    info!("Runner initialized successfully");
    if let Err(e) = poller.run().await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Waits until the orchestrator answers its health check, with exponential backoff
///
/// The orchestrator may not be ready yet when the runner starts (common in
/// container environments).
async fn wait_for_orchestrator(client: &OrchestratorClient) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.health_check().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Orchestrator answered after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Orchestrator unreachable after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Orchestrator is unreachable: {}", e));
                }

                warn!(
                    "Orchestrator not ready (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
