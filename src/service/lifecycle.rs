//! Lifecycle, status and data operations exposed to the orchestrator

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::io;
use std::path::Path;
use tokio::process::Command;

use super::engine::{ContainerDetails, RemoveOptions};
use super::error::{Result, ServiceError};
use super::{exec, logs, LogFollower, Service};

/// Status string reported for a running container
pub const RUNNING_STATUS: &str = "Container running";

/// What the orchestrator can do with a managed service
#[async_trait]
pub trait ManagedService: Send + Sync {
    fn name(&self) -> &str;

    /// Create the container through the compose tool without starting it
    async fn create(&self) -> Result<()>;

    /// Create and start the container through the compose tool
    async fn up(&self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    /// Force-remove the container together with its volumes
    async fn remove(&self) -> Result<()>;

    /// Display status such as `Container running`
    async fn status(&self) -> Result<String>;

    /// False whenever the status cannot be determined
    async fn is_running(&self) -> bool {
        matches!(self.status().await, Ok(status) if status == RUNNING_STATUS)
    }

    /// When the container last started, `None` if it never has
    async fn started_at(&self) -> Result<Option<DateTime<Utc>>>;

    async fn get_logs(&self, since: &str, tail: &str) -> Result<Vec<String>>;

    async fn follow_logs(&self, since: &str, tail: &str) -> Result<LogFollower>;

    async fn exec(&self, command: &str, args: &[&str]) -> Result<String>;

    /// Delete the data directory, falling back to privileged removal once
    async fn remove_data(&self) -> Result<()>;

    fn mode(&self) -> &str {
        ""
    }

    /// Attempt to bring a misbehaving service back; true when nothing is left to do
    async fn rescue(&self) -> bool {
        true
    }

    fn rpc_params(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

#[async_trait]
impl ManagedService for Service {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self) -> Result<()> {
        log::info!("Creating container for {}", self.name);
        self.compose().create(&self.name).await
    }

    async fn up(&self) -> Result<()> {
        log::info!("Bringing up {}", self.name);
        self.compose().up(&self.name).await
    }

    async fn start(&self) -> Result<()> {
        log::info!("Starting {}", self.container_name());
        self.engine()
            .start_container(self.container_name())
            .await
            .map_err(|e| ServiceError::engine("start container", self.container_name(), e))
    }

    async fn stop(&self) -> Result<()> {
        log::info!("Stopping {}", self.container_name());
        self.engine()
            .stop_container(self.container_name())
            .await
            .map_err(|e| ServiceError::engine("stop container", self.container_name(), e))
    }

    async fn restart(&self) -> Result<()> {
        log::info!("Restarting {}", self.container_name());
        self.engine()
            .restart_container(self.container_name())
            .await
            .map_err(|e| ServiceError::engine("restart container", self.container_name(), e))
    }

    async fn remove(&self) -> Result<()> {
        log::info!("Removing {}", self.container_name());
        let options = RemoveOptions {
            remove_volumes: true,
            force: true,
        };
        self.engine()
            .remove_container(self.container_name(), options)
            .await
            .map_err(|e| ServiceError::engine("remove container", self.container_name(), e))
    }

    async fn status(&self) -> Result<String> {
        let details = self.inspect().await?;
        Ok(project_status(&details))
    }

    async fn started_at(&self) -> Result<Option<DateTime<Utc>>> {
        let details = self.inspect().await?;
        parse_started_at(details.started_at)
    }

    async fn get_logs(&self, since: &str, tail: &str) -> Result<Vec<String>> {
        logs::get_logs(self.engine(), self.container_name(), since, tail).await
    }

    async fn follow_logs(&self, since: &str, tail: &str) -> Result<LogFollower> {
        logs::follow_logs(self.engine(), self.container_name(), since, tail).await
    }

    async fn exec(&self, command: &str, args: &[&str]) -> Result<String> {
        let command = exec::command_line(command, args.iter().copied());
        exec::exec_in_container(self.engine(), self.container_name(), command).await
    }

    async fn remove_data(&self) -> Result<()> {
        let dir = self.data_dir();
        if dir.as_os_str().is_empty() {
            log::debug!("Service {} has no data directory", self.name);
            return Ok(());
        }

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                log::warn!("Forcefully removing {} ({})", dir.display(), e);
                privileged_remove(self.privileged_remove_command(), dir).await
            }
        }
    }
}

impl Service {
    async fn inspect(&self) -> Result<ContainerDetails> {
        self.engine()
            .inspect_container(self.container_name())
            .await
            .map_err(|e| ServiceError::engine("inspect container", self.container_name(), e))
    }
}

fn project_status(details: &ContainerDetails) -> String {
    format!("Container {}", details.status.as_deref().unwrap_or("unknown"))
}

fn parse_started_at(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return Ok(None);
    };

    let started_at = DateTime::parse_from_rfc3339(&raw)
        .map_err(|source| ServiceError::InvalidTimestamp {
            value: raw.clone(),
            source,
        })?
        .with_timezone(&Utc);

    // the engine reports year 1 for containers that never started
    if started_at.year() <= 1 {
        return Ok(None);
    }
    Ok(Some(started_at))
}

async fn privileged_remove(command: &[String], dir: &Path) -> Result<()> {
    let (program, args) = command.split_first().ok_or_else(|| {
        ServiceError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no privileged remove command configured",
        ))
    })?;

    let status = Command::new(program).args(args).arg(dir).status().await?;
    if !status.success() {
        return Err(ServiceError::RemoveData {
            path: dir.to_path_buf(),
            status,
        });
    }
    Ok(())
}
