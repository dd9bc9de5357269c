use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors reported by a [`ContainerEngine`](super::engine::ContainerEngine)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("no such container or exec: {0}")]
    NotFound(String),
    #[error("engine API error: {0}")]
    Api(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("exec started detached, no output stream available")]
    Detached,
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            other => EngineError::Api(other.to_string()),
        }
    }
}

/// A command that ran inside the container and exited non-zero.
///
/// Distinct from a transport failure: the command was executed, its combined
/// output was captured, and only the exit code says it failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExecError {
    pub command: Vec<String>,
    pub output: String,
    pub exit_code: i64,
    pub message: String,
}

impl ExecError {
    pub fn new(command: Vec<String>, output: String, exit_code: i64) -> Self {
        let message = format!(
            "command \"{}\" failed with exit code {}: {}",
            command.join(" "),
            exit_code,
            output.trim()
        );
        Self {
            command,
            output,
            exit_code,
            message,
        }
    }
}

/// Errors returned by [`Service`](super::Service) operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{op} {container}: {source}")]
    Engine {
        op: &'static str,
        container: String,
        #[source]
        source: EngineError,
    },
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("compose {args}: {reason}")]
    Compose { args: String, reason: String },
    #[error("failed to remove data directory {}: privileged removal exited with {status}", .path.display())]
    RemoveData { path: PathBuf, status: ExitStatus },
    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub(crate) fn engine(op: &'static str, container: &str, source: EngineError) -> Self {
        ServiceError::Engine {
            op,
            container: container.to_string(),
            source,
        }
    }

    /// The structured failure when a command ran but exited non-zero
    pub fn exec_failure(&self) -> Option<&ExecError> {
        match self {
            ServiceError::Exec(err) => Some(err),
            _ => None,
        }
    }

    /// True when the engine could not resolve the container at all
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Engine { source, .. } if source.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_error_message_joins_command_and_trims_output() {
        let err = ExecError::new(
            vec!["ls".to_string(), "/missing".to_string()],
            "\n  ls: /missing: No such file or directory\n".to_string(),
            2,
        );

        assert_eq!(
            err.message,
            "command \"ls /missing\" failed with exit code 2: ls: /missing: No such file or directory"
        );
        assert_eq!(err.to_string(), err.message);
        // output is kept untrimmed
        assert!(err.output.starts_with('\n'));
    }

    #[test]
    fn test_exec_failure_only_for_exec_variant() {
        let exec: ServiceError = ExecError::new(vec!["false".to_string()], String::new(), 1).into();
        assert_eq!(exec.exec_failure().map(|e| e.exit_code), Some(1));

        let transport = ServiceError::engine(
            "create exec",
            "net_svc_1",
            EngineError::Api("boom".to_string()),
        );
        assert!(transport.exec_failure().is_none());
        assert_eq!(transport.to_string(), "create exec net_svc_1: engine API error: boom");
    }

    #[test]
    fn test_not_found_detection() {
        let err = ServiceError::engine(
            "inspect container",
            "net_svc_1",
            EngineError::NotFound("No such container: net_svc_1".to_string()),
        );
        assert!(err.is_not_found());
        assert!(!ServiceError::Io(std::io::Error::other("x")).is_not_found());
    }
}
