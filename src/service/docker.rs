//! Docker-backed [`ContainerEngine`] built on bollard

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::query_parameters::{
    InspectContainerOptions, LogsOptions, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;

use super::engine::{
    ContainerDetails, ContainerEngine, ExecSpec, FrameStream, LogsRequest, OutputFrame,
    RemoveOptions, StreamKind,
};
use super::error::EngineError;

/// Engine backed by a bollard client. Cheap to clone; share one per process.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using `DOCKER_HOST` or the platform's default socket
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()?;
        log::debug!("Connected to Docker daemon");
        Ok(Self::new(docker))
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

impl From<LogOutput> for OutputFrame {
    fn from(output: LogOutput) -> Self {
        match output {
            LogOutput::StdIn { message } => OutputFrame::new(StreamKind::Stdin, message),
            LogOutput::StdOut { message } => OutputFrame::new(StreamKind::Stdout, message),
            LogOutput::StdErr { message } => OutputFrame::new(StreamKind::Stderr, message),
            LogOutput::Console { message } => OutputFrame::new(StreamKind::Console, message),
        }
    }
}

fn into_frame_stream<S>(stream: S) -> FrameStream
where
    S: futures_util::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Send + 'static,
{
    Box::pin(stream.map(|item| item.map(OutputFrame::from).map_err(EngineError::from)))
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(name, Some(StartContainerOptions::default()))
            .await?;
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(name, Some(StopContainerOptions::default()))
            .await?;
        Ok(())
    }

    async fn restart_container(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .restart_container(name, Some(RestartContainerOptions::default()))
            .await?;
        Ok(())
    }

    async fn remove_container(
        &self,
        name: &str,
        options: RemoveOptions,
    ) -> Result<(), EngineError> {
        let remove_options = RemoveContainerOptions {
            v: options.remove_volumes,
            force: options.force,
            link: false,
        };
        self.docker
            .remove_container(name, Some(remove_options))
            .await?;
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError> {
        let inspect = self
            .docker
            .inspect_container(name, Some(InspectContainerOptions::default()))
            .await?;

        let details = match inspect.state {
            Some(state) => ContainerDetails {
                status: state
                    .status
                    .map(|status| status.to_string())
                    .filter(|status| !status.is_empty()),
                started_at: state.started_at,
            },
            None => ContainerDetails::default(),
        };
        Ok(details)
    }

    async fn logs(&self, name: &str, request: LogsRequest) -> Result<FrameStream, EngineError> {
        // bollard only sends the request on first poll; resolve the container
        // now so a missing one is reported by this call.
        self.inspect_container(name).await?;

        let options = LogsOptions {
            follow: request.follow,
            stdout: true,
            stderr: true,
            since: parse_since(&request.since, Utc::now())?,
            tail: normalize_tail(&request.tail),
            ..Default::default()
        };
        log::debug!(
            "Opening log stream for {} (since={}, tail={}, follow={})",
            name,
            options.since,
            options.tail,
            options.follow
        );

        Ok(into_frame_stream(self.docker.logs(name, Some(options))))
    }

    async fn create_exec(&self, name: &str, spec: ExecSpec) -> Result<String, EngineError> {
        let exec_config = CreateExecOptions {
            cmd: Some(spec.cmd),
            tty: Some(spec.tty),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            ..Default::default()
        };
        let exec = self.docker.create_exec(name, exec_config).await?;
        Ok(exec.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<FrameStream, EngineError> {
        let start_config = StartExecOptions {
            detach: false,
            tty: false,
            ..Default::default()
        };

        match self.docker.start_exec(exec_id, Some(start_config)).await? {
            StartExecResults::Attached { output, .. } => Ok(into_frame_stream(output)),
            StartExecResults::Detached => Err(EngineError::Detached),
        }
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<Option<i64>, EngineError> {
        let inspect = self.docker.inspect_exec(exec_id).await?;
        Ok(inspect.exit_code)
    }
}

/// Resolve a `since` filter into the unix timestamp the API expects.
///
/// Accepts an empty string, a unix timestamp, an RFC 3339 timestamp or a
/// relative duration (`45s`, `10m`, `1h30m`) counted back from `now`.
pub fn parse_since(since: &str, now: DateTime<Utc>) -> Result<i32, EngineError> {
    let since = since.trim();
    if since.is_empty() {
        return Ok(0);
    }

    if let Ok(seconds) = since.parse::<i64>() {
        return to_api_timestamp(seconds, since);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(since) {
        return to_api_timestamp(timestamp.timestamp(), since);
    }

    let seconds = parse_duration_secs(since)
        .ok_or_else(|| EngineError::Api(format!("invalid since filter {:?}", since)))?;
    to_api_timestamp(now.timestamp() - seconds, since)
}

fn to_api_timestamp(seconds: i64, raw: &str) -> Result<i32, EngineError> {
    i32::try_from(seconds.max(0))
        .map_err(|_| EngineError::Api(format!("since filter out of range: {:?}", raw)))
}

fn parse_duration_secs(input: &str) -> Option<i64> {
    let mut total = 0i64;
    let mut digits = String::new();

    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            _ => return None,
        };
        let value: i64 = digits.parse().ok()?;
        total = total.checked_add(value.checked_mul(unit)?)?;
        digits.clear();
    }

    // trailing digits without a unit are ambiguous
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

fn normalize_tail(tail: &str) -> String {
    match tail.trim() {
        "" => "all".to_string(),
        other => other.to_string(),
    }
}
