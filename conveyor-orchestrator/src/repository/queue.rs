//! Work Queue
//!
//! The broker that carries job identifiers from the dispatcher to runners.
//! The dispatcher only needs `exists`, `enqueue` and `outstanding`; runners
//! reach `dequeue` through the orchestrator's claim endpoint.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// Queue operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was never declared on the broker
    #[error("queue not found: {0}")]
    NotFound(String),

    /// The broker could not be reached
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// A named-queue message broker
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Out-of-band existence check
    async fn exists(&self, queue: &str) -> Result<bool, QueueError>;

    /// Appends a message to the tail of `queue`
    async fn enqueue(&self, queue: &str, message: String) -> Result<(), QueueError>;

    /// Number of messages enqueued and not yet taken
    async fn outstanding(&self, queue: &str) -> Result<usize, QueueError>;

    /// Takes the message at the head of `queue`, if any
    async fn dequeue(&self, queue: &str) -> Result<Option<String>, QueueError>;
}

/// In-process FIFO broker used by a single-node deployment
#[derive(Debug, Default)]
pub struct InMemoryWorkQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `queue`; declaring an existing queue keeps its messages
    pub fn declare(&self, queue: &str) -> Result<(), QueueError> {
        let mut queues = self.lock()?;
        queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, VecDeque<String>>>, QueueError> {
        self.queues
            .lock()
            .map_err(|e| QueueError::Unavailable(format!("queue lock poisoned: {}", e)))
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn exists(&self, queue: &str) -> Result<bool, QueueError> {
        Ok(self.lock()?.contains_key(queue))
    }

    async fn enqueue(&self, queue: &str, message: String) -> Result<(), QueueError> {
        let mut queues = self.lock()?;
        let messages = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::NotFound(queue.to_string()))?;
        messages.push_back(message);
        Ok(())
    }

    async fn outstanding(&self, queue: &str) -> Result<usize, QueueError> {
        let queues = self.lock()?;
        queues
            .get(queue)
            .map(VecDeque::len)
            .ok_or_else(|| QueueError::NotFound(queue.to_string()))
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<String>, QueueError> {
        let mut queues = self.lock()?;
        let messages = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::NotFound(queue.to_string()))?;
        Ok(messages.pop_front())
    }
}
