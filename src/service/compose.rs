//! Runs the external compose tool for a single service

use std::process::Stdio;
use tokio::process::Command;

use super::error::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct ComposeTool {
    command: Vec<String>,
}

impl ComposeTool {
    /// `command` is the program plus any fixed leading arguments
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Create the service's container without starting it
    pub async fn create(&self, service: &str) -> Result<()> {
        self.run(&["up", "-d", "--no-start", service]).await
    }

    /// Create and start the service's container
    pub async fn up(&self, service: &str) -> Result<()> {
        self.run(&["up", "-d", service]).await
    }

    fn args_display(&self, args: &[&str]) -> String {
        self.command
            .iter()
            .map(String::as_str)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let display = self.args_display(args);
        let (program, base_args) = self.command.split_first().ok_or_else(|| {
            ServiceError::Compose {
                args: display.clone(),
                reason: "no compose program configured".to_string(),
            }
        })?;

        log::info!("Running {}", display);
        let status = Command::new(program)
            .args(base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| ServiceError::Compose {
                args: display.clone(),
                reason: format!("failed to spawn: {}", e),
            })?;

        if !status.success() {
            return Err(ServiceError::Compose {
                args: display,
                reason: format!("exited with {}", status),
            });
        }
        Ok(())
    }
}
