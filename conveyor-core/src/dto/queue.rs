//! Work queue DTOs

use serde::{Deserialize, Serialize};

/// Request to take the next job off a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimJob {
    pub runner_id: String,
}

/// Depth of a work queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    /// Messages enqueued and not yet taken by a worker
    pub outstanding: usize,
}
