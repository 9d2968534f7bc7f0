//! Service Module
//!
//! Business logic layer for the orchestrator: definition validation, stage
//! dispatch, pipeline coordination and the worker-facing job operations.

pub mod barrier;
pub mod coordinator;
pub mod dispatcher;
pub mod job;
pub mod observer;
pub mod validation;

// Re-export for convenience
pub use barrier::{DrainBarrier, PollingDrainBarrier};
pub use coordinator::PipelineCoordinator;
pub use dispatcher::{DispatchError, StageDispatcher};
pub use job as job_service;
pub use observer::{PipelineObserver, TracingObserver};
