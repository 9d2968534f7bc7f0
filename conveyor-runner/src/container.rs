//! Container runtime seam
//!
//! The runner only needs four operations from a container runtime: create,
//! start, wait and remove. A created container is held in a `ContainerLease`
//! so it is removed on every exit path.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything needed to create a job container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, unique per job
    pub name: String,
    /// Image reference
    pub image: String,
    /// Shell invocation passed to `/bin/sh -c`
    pub script: String,
    /// Environment variables injected into the container
    pub env: HashMap<String, String>,
}

/// External container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates a container and returns its handle
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, handle: &str) -> Result<()>;

    /// Blocks until the container exits and returns its exit code
    async fn wait(&self, handle: &str) -> Result<i32>;

    async fn remove(&self, handle: &str) -> Result<()>;
}

/// A created container, removed when the lease is released or dropped
pub struct ContainerLease {
    runtime: Arc<dyn ContainerRuntime>,
    handle: String,
    released: bool,
}

impl ContainerLease {
    /// Creates a container and takes ownership of it
    pub async fn acquire(runtime: Arc<dyn ContainerRuntime>, spec: &ContainerSpec) -> Result<Self> {
        let handle = runtime.create(spec).await?;
        debug!("Created container {} for image {}", handle, spec.image);
        Ok(Self {
            runtime,
            handle,
            released: false,
        })
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Starts the container and waits for it to exit
    pub async fn run_to_completion(&self) -> Result<i32> {
        self.runtime.start(&self.handle).await?;
        self.runtime.wait(&self.handle).await
    }

    /// Removes the container
    pub async fn release(mut self) {
        self.released = true;
        match self.runtime.remove(&self.handle).await {
            Ok(()) => debug!("Container {} removed", self.handle),
            Err(e) => warn!("Failed to remove container {}: {:#}", self.handle, e),
        }
    }
}

impl Drop for ContainerLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Dropped without release (task aborted or panicked mid-run)
        let runtime = Arc::clone(&self.runtime);
        let handle = std::mem::take(&mut self.handle);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if let Err(e) = runtime.remove(&handle).await {
                        warn!("Failed to remove container {} on drop: {:#}", handle, e);
                    }
                });
            }
            Err(_) => warn!("No runtime to remove container {} on drop", handle),
        }
    }
}

/// Composes a job script into one shell invocation that stops at the first
/// failing command
pub fn compose_script(commands: &[String]) -> String {
    commands
        .iter()
        .map(|command| command.trim())
        .filter(|command| !command.is_empty())
        .collect::<Vec<_>>()
        .join(" && ")
}


#[cfg(test)]
mod tests {
    use super::fake::FakeRuntime;
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "job-1".to_string(),
            image: "alpine".to_string(),
            script: "true".to_string(),
            env: HashMap::new(),
        }
    }

    #[test]
    fn test_compose_script_chains_commands() {
        let commands = vec![
            "make".to_string(),
            "  ".to_string(),
            "make test ".to_string(),
        ];
        assert_eq!(compose_script(&commands), "make && make test");
    }

    #[tokio::test]
    async fn test_release_removes_container() {
        let runtime = Arc::new(FakeRuntime::exiting_with(0));
        let lease = ContainerLease::acquire(runtime.clone(), &spec()).await.unwrap();
        assert_eq!(lease.run_to_completion().await.unwrap(), 0);

        lease.release().await;
        assert_eq!(runtime.removed(), vec!["ctr-job-1".to_string()]);
    }

    #[tokio::test]
    async fn test_drop_without_release_still_removes() {
        let runtime = Arc::new(FakeRuntime::exiting_with(0));
        {
            let _lease = ContainerLease::acquire(runtime.clone(), &spec()).await.unwrap();
        }

        // Removal runs on a spawned task
        for _ in 0..10 {
            if !runtime.removed().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(runtime.removed(), vec!["ctr-job-1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_create_holds_nothing() {
        let runtime = Arc::new(FakeRuntime {
            fail_create: true,
            ..FakeRuntime::default()
        });
        assert!(ContainerLease::acquire(runtime.clone(), &spec()).await.is_err());
        assert!(runtime.removed().is_empty());
    }
}
