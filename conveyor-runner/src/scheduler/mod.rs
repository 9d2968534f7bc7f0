//! Scheduler layer for the runner
//!
//! This layer polls the orchestrator's work queue and hands claimed jobs to
//! the job runner, bounded by the configured parallelism.

pub mod poller;

pub use poller::JobPoller;
