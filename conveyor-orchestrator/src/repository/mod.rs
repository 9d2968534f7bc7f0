//! Repository Module
//!
//! In-memory state shared across the orchestrator: the work queue, the job
//! status store and the registry of pipeline runs.

pub mod queue;
pub mod run;
pub mod status;

// Re-export for convenience
pub use queue::{InMemoryWorkQueue, QueueError, WorkQueue};
pub use run::PipelineRunRepository;
pub use status::{JobStatusStore, StatusError};
