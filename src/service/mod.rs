//! Per-service container management
//!
//! A [`Service`] is the launcher's reference to one compose-managed
//! container. It holds declared configuration only; every engine operation
//! resolves the container by name at call time, so nothing cached can go
//! stale between calls.

pub mod compose;
pub mod config;
pub mod demux;
pub mod docker;
pub mod engine;
pub mod error;
pub mod exec;
pub mod lifecycle;
pub mod logs;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use compose::ComposeTool;
pub use config::{LauncherConfig, ServiceConfig, ServiceContext};
pub use docker::DockerEngine;
pub use engine::{ContainerEngine, OutputFrame, StreamKind};
pub use error::{EngineError, ExecError, Result, ServiceError};
pub use lifecycle::{ManagedService, RUNNING_STATUS};
pub use logs::{CancelHandle, LogFollower, LogLine};

pub struct Service {
    name: String,
    context: ServiceContext,
    container_name: String,

    hostname: String,
    image: String,
    command: Vec<String>,
    environment: HashMap<String, String>,
    ports: Vec<String>,
    volumes: Vec<String>,
    disabled: bool,
    data_dir: PathBuf,

    engine: Arc<dyn ContainerEngine>,
    compose: ComposeTool,
    privileged_remove_command: Vec<String>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("container_name", &self.container_name)
            .field("image", &self.image)
            .field("disabled", &self.disabled)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn new(
        name: impl Into<String>,
        context: ServiceContext,
        engine: Arc<dyn ContainerEngine>,
        launcher: &LauncherConfig,
    ) -> Self {
        let name = name.into();
        Self {
            container_name: container_name(&context.network, &name),
            hostname: name.clone(),
            name,
            context,
            image: String::new(),
            command: Vec::new(),
            environment: HashMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            disabled: false,
            data_dir: PathBuf::new(),
            engine,
            compose: ComposeTool::new(launcher.compose_command.clone()),
            privileged_remove_command: launcher.privileged_remove_command.clone(),
        }
    }

    /// Apply typed configuration.
    ///
    /// Environment is reset to the single `NETWORK` entry; volumes and
    /// command are cleared. Ports come from `expose_ports`.
    pub fn apply(&mut self, config: &ServiceConfig) {
        self.image = config.image.clone();
        self.disabled = config.disabled;
        self.data_dir = config.dir.clone();
        self.environment = HashMap::from([("NETWORK".to_string(), self.context.network.clone())]);
        self.ports = config.expose_ports.clone();
        self.volumes = Vec::new();
        self.command = Vec::new();
        log::debug!("Applied configuration to service {}: {:?}", self.name, config);
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub(crate) fn engine(&self) -> &dyn ContainerEngine {
        self.engine.as_ref()
    }

    pub(crate) fn compose(&self) -> &ComposeTool {
        &self.compose
    }

    pub(crate) fn privileged_remove_command(&self) -> &[String] {
        &self.privileged_remove_command
    }
}

/// Container name compose assigns to the first instance of a service
pub fn container_name(network: &str, service: &str) -> String {
    format!("{}_{}_1", network, service)
}
