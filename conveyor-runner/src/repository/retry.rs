//! Bounded retry for calls to the orchestrator

use conveyor_client::ClientError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times a call is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// the attempts run out; the last error is returned
    pub async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && e.is_retryable() => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        what, attempt, self.attempts, e
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
