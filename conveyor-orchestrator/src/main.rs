use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod repository;
pub mod service;

use crate::api::AppState;
use crate::config::Config;
use crate::repository::{InMemoryWorkQueue, JobStatusStore, PipelineRunRepository, WorkQueue};
use crate::service::{
    PipelineCoordinator, PipelineObserver, PollingDrainBarrier, StageDispatcher, TracingObserver,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conveyor Orchestrator...");

    let config = Config::from_env();
    config.validate()?;

    tracing::info!(
        "Work queue: {}, drain poll interval: {:?}, claim timeout: {:?}",
        config.queue_name,
        config.drain_poll_interval,
        config.claim_timeout
    );

    let broker = InMemoryWorkQueue::new();
    broker.declare(&config.queue_name)?;
    let queue: Arc<dyn WorkQueue> = Arc::new(broker);

    let store = Arc::new(JobStatusStore::with_claim_timeout(config.claim_timeout));
    let runs = Arc::new(PipelineRunRepository::with_retention(config.retained_runs));
    let observer: Arc<dyn PipelineObserver> = Arc::new(TracingObserver);

    let barrier = Arc::new(PollingDrainBarrier::new(
        queue.clone(),
        store.clone(),
        config.drain_poll_interval,
    ));
    let dispatcher = StageDispatcher::new(
        queue.clone(),
        store.clone(),
        barrier,
        observer.clone(),
        config.queue_name.clone(),
    );
    let coordinator = Arc::new(PipelineCoordinator::new(
        store.clone(),
        runs.clone(),
        dispatcher,
        observer,
    ));

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        queue,
        store,
        runs,
        coordinator,
        queue_name: config.queue_name.clone(),
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Orchestrator stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
