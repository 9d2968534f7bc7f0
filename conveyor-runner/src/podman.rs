//! Podman container runtime
//!
//! Drives the podman CLI for the job container lifecycle:
//! - Checking podman availability
//! - Creating a container that runs the composed job script
//! - Starting it and waiting for its exit code
//! - Force-removing it afterwards

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Command;
use tracing::{debug, error, info};

use crate::container::{ContainerRuntime, ContainerSpec};

/// Checks if the runtime binary is installed and available
pub fn check_runtime_available(binary: &str) -> Result<()> {
    let output = Command::new(binary)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to execute '{} --version'. Is it installed?", binary))?;

    if !output.status.success() {
        anyhow::bail!("{} is not working correctly", binary);
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Container runtime is available: {}", version.trim());

    Ok(())
}

/// Podman-compatible CLI runtime
pub struct PodmanRuntime {
    binary: String,
}

impl PodmanRuntime {
    /// Creates a runtime driving `binary` (e.g., "podman")
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments of `podman create` for a job container
    ///
    /// The image entrypoint is overridden with `/bin/sh` so images with
    /// custom entrypoints still run the job script.
    fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--entrypoint".to_string(),
            "/bin/sh".to_string(),
        ];

        let mut env: Vec<_> = spec.env.iter().collect();
        env.sort();
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(spec.image.clone());
        args.push("-c".to_string());
        args.push(spec.script.clone());
        args
    }

    /// Runs one podman command and returns its trimmed stdout
    async fn exec(&self, args: &[String]) -> Result<String> {
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {} {}", self.binary, args[0]))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stderr.is_empty() {
            debug!("{} {} stderr: {}", self.binary, args[0], stderr);
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let error_msg = format!(
                "{} {} failed: exit_code={}, stderr='{}'",
                self.binary, args[0], exit_code, stderr
            );
            error!("{}", error_msg);
            anyhow::bail!("{}", error_msg);
        }

        Ok(stdout)
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        info!("Creating container {} for image {}", spec.name, spec.image);
        let id = self.exec(&Self::create_args(spec)).await?;
        if id.is_empty() {
            anyhow::bail!("{} create returned no container id", self.binary);
        }
        Ok(id)
    }

    async fn start(&self, handle: &str) -> Result<()> {
        self.exec(&["start".to_string(), handle.to_string()])
            .await
            .map(|_| ())
    }

    async fn wait(&self, handle: &str) -> Result<i32> {
        let stdout = self.exec(&["wait".to_string(), handle.to_string()]).await?;
        stdout
            .lines()
            .last()
            .unwrap_or_default()
            .trim()
            .parse::<i32>()
            .with_context(|| format!("Unexpected output from {} wait: '{}'", self.binary, stdout))
    }

    async fn remove(&self, handle: &str) -> Result<()> {
        self.exec(&["rm".to_string(), "-f".to_string(), handle.to_string()])
            .await
            .map(|_| ())
    }
}
