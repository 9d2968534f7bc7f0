//! Repository layer
//!
//! Repositories abstract communication with the orchestrator. They provide
//! simple, focused interfaces for the work queue and the status channel
//! without any business logic.
//!
//! All repositories are trait-based to enable testing with fakes.

mod jobs;
mod retry;
mod status;

// Re-export traits
pub use jobs::JobRepository;
pub use status::StatusRepository;

// Re-export implementations
pub use jobs::HttpJobRepository;
pub use retry::RetryPolicy;
pub use status::{HttpStatusRepository, is_rejection};
