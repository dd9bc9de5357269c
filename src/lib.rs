pub mod service;

pub use service::{
    container_name, ContainerEngine, DockerEngine, EngineError, ExecError, LauncherConfig,
    LogFollower, LogLine, ManagedService, Service, ServiceConfig, ServiceContext, ServiceError,
};
