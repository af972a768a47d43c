//! Orchestration tool invocation (`lando start`, `lando rebuild -y`)
//!
//! Both run inside the instance directory with the terminal inherited, and
//! block until the tool exits.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::OrchestrationError;

/// Starts and rebuilds instance environments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrchestrationRunner: Send + Sync {
    /// Bring the environment in `instance_dir` up
    async fn start(&self, instance_dir: &Path) -> Result<(), OrchestrationError>;

    /// Rebuild the environment in `instance_dir` after a change
    async fn rebuild(&self, instance_dir: &Path) -> Result<(), OrchestrationError>;
}

/// Runner backed by the `lando` CLI
#[derive(Debug, Clone)]
pub struct LandoRunner {
    program: String,
}

impl LandoRunner {
    /// Create runner invoking `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, instance_dir: &Path, args: &[&str]) -> Result<(), OrchestrationError> {
        let command = format!("{} {}", self.program, args.join(" "));
        tracing::info!("running `{command}` in {}", instance_dir.display());

        let status = Command::new(&self.program)
            .args(args)
            .current_dir(instance_dir)
            .status()
            .await
            .map_err(|source| OrchestrationError::Spawn {
                command: command.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(OrchestrationError::Failed { command, status })
        }
    }
}

#[async_trait]
impl OrchestrationRunner for LandoRunner {
    async fn start(&self, instance_dir: &Path) -> Result<(), OrchestrationError> {
        self.run(instance_dir, &["start"]).await
    }

    async fn rebuild(&self, instance_dir: &Path) -> Result<(), OrchestrationError> {
        self.run(instance_dir, &["rebuild", "-y"]).await
    }
}
