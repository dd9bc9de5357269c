use super::demux;
use super::engine::{ContainerEngine, ExecSpec};
use super::error::{ExecError, Result, ServiceError};

/// Exit code assumed when the engine does not report one
pub const UNKNOWN_EXIT_CODE: i64 = -1;

/// Run a command inside the container and wait for it to finish.
///
/// Creates the exec, attaches to it (which starts it), drains the combined
/// stdout/stderr until the stream closes, then inspects the exit code. A
/// non-zero exit code becomes [`ServiceError::Exec`] carrying the captured
/// output; any engine failure along the way names the step that failed.
pub async fn exec_in_container(
    engine: &dyn ContainerEngine,
    container: &str,
    command: Vec<String>,
) -> Result<String> {
    log::debug!("Executing command in container {}: {:?}", container, command);

    let exec_id = engine
        .create_exec(container, ExecSpec::captured(command.clone()))
        .await
        .map_err(|e| ServiceError::engine("create exec", container, e))?;
    log::debug!("Created exec {} in {}", exec_id, container);

    let frames = engine
        .start_exec(&exec_id)
        .await
        .map_err(|e| ServiceError::engine("attach exec", container, e))?;

    let buf = demux::capture(frames)
        .await
        .map_err(|e| ServiceError::engine("read exec output", container, e))?;
    let output = String::from_utf8_lossy(&buf).into_owned();

    let exit_code = engine
        .inspect_exec(&exec_id)
        .await
        .map_err(|e| ServiceError::engine("inspect exec", container, e))?
        .unwrap_or(UNKNOWN_EXIT_CODE);

    log::debug!(
        "Command completed with exit code {} ({} bytes of output)",
        exit_code,
        output.len()
    );

    if exit_code != 0 {
        let err = ExecError::new(command, output, exit_code);
        log::warn!("{}", err.message);
        return Err(err.into());
    }

    Ok(output)
}

/// Build the argument vector for a command and its arguments
pub fn command_line<I, S>(name: &str, args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    std::iter::once(name.to_string())
        .chain(args.into_iter().map(Into::into))
        .collect()
}
