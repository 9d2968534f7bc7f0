//! Service layer
//!
//! Services contain business logic for the runner. They orchestrate
//! operations using repositories and the container runtime.

mod job_runner;

pub use job_runner::JobRunner;
