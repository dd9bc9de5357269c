//! Container engine capability
//!
//! Every service talks to the engine through [`ContainerEngine`], which is
//! injected at construction and shared between services. The Docker-backed
//! implementation lives in [`super::docker`]; tests supply an in-memory one.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

use super::error::EngineError;

/// Which output stream a frame was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    /// Output of a TTY-attached process, not split into stdout/stderr
    Console,
}

/// One block of bytes from a multiplexed engine stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFrame {
    pub kind: StreamKind,
    pub data: Bytes,
}

impl OutputFrame {
    pub fn new(kind: StreamKind, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn stdout(data: impl Into<Bytes>) -> Self {
        Self::new(StreamKind::Stdout, data)
    }

    pub fn stderr(data: impl Into<Bytes>) -> Self {
        Self::new(StreamKind::Stderr, data)
    }
}

/// Frames in arrival order; dropping the stream closes it on the engine side
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<OutputFrame, EngineError>> + Send>>;

/// Log request filters, forwarded to the engine as given
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsRequest {
    pub since: String,
    pub tail: String,
    pub follow: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub remove_volumes: bool,
    pub force: bool,
}

/// Exec creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub tty: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

impl ExecSpec {
    /// Non-interactive exec capturing stdout and stderr
    pub fn captured(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            tty: false,
            attach_stdin: false,
            attach_stdout: true,
            attach_stderr: true,
        }
    }
}

/// The parts of a container inspection this crate relies on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    /// Raw state, e.g. `running`, `exited`, `created`
    pub status: Option<String>,
    /// RFC 3339 start timestamp as reported by the engine
    pub started_at: Option<String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn start_container(&self, name: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, name: &str) -> Result<(), EngineError>;

    async fn restart_container(&self, name: &str) -> Result<(), EngineError>;

    async fn remove_container(&self, name: &str, options: RemoveOptions)
        -> Result<(), EngineError>;

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError>;

    /// Open a log stream. Fails up front if the container cannot be resolved.
    async fn logs(&self, name: &str, request: LogsRequest) -> Result<FrameStream, EngineError>;

    /// Create an exec instance and return its id
    async fn create_exec(&self, name: &str, spec: ExecSpec) -> Result<String, EngineError>;

    /// Attach to (and thereby start) an exec instance
    async fn start_exec(&self, exec_id: &str) -> Result<FrameStream, EngineError>;

    /// Exit code of a finished exec, if the engine recorded one
    async fn inspect_exec(&self, exec_id: &str) -> Result<Option<i64>, EngineError>;
}
