//! In-memory container engine used by the integration tests
//!
//! Log and exec output is stored as frames, encoded to the engine's wire
//! format and decoded again through `decode_multiplexed`, so every test also
//! runs the real frame decoder.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use service_launcher::service::demux::decode_multiplexed;
use service_launcher::service::engine::{
    ContainerDetails, ContainerEngine, ExecSpec, FrameStream, LogsRequest, OutputFrame,
    RemoveOptions, StreamKind,
};
use service_launcher::{EngineError, LauncherConfig, Service, ServiceContext};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const NETWORK: &str = "testnet";

/// Encode frames the way the engine puts them on the wire
pub fn encode_frames(frames: &[OutputFrame]) -> Vec<u8> {
    let mut wire = Vec::new();
    for frame in frames {
        let kind = match frame.kind {
            StreamKind::Stdin => 0u8,
            StreamKind::Stdout | StreamKind::Console => 1,
            StreamKind::Stderr => 2,
        };
        wire.extend_from_slice(&[kind, 0, 0, 0]);
        wire.extend_from_slice(&(frame.data.len() as u32).to_be_bytes());
        wire.extend_from_slice(&frame.data);
    }
    wire
}

pub fn stdout(text: &str) -> OutputFrame {
    OutputFrame::stdout(Bytes::copy_from_slice(text.as_bytes()))
}

pub fn stderr(text: &str) -> OutputFrame {
    OutputFrame::stderr(Bytes::copy_from_slice(text.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct ScriptedExec {
    pub output: Vec<OutputFrame>,
    pub exit_code: Option<i64>,
    /// Cut the wire output this many bytes short
    pub truncate_by: usize,
}

impl ScriptedExec {
    pub fn new(output: Vec<OutputFrame>, exit_code: i64) -> Self {
        Self {
            output,
            exit_code: Some(exit_code),
            truncate_by: 0,
        }
    }
}

/// Sets its flag when dropped, i.e. when the stream holding it is closed
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, ContainerDetails>,
    logs: HashMap<String, Vec<OutputFrame>>,
    truncated_logs: HashMap<String, usize>,
    follow_feeds: HashMap<String, mpsc::UnboundedReceiver<Result<OutputFrame, EngineError>>>,
    follow_closed: HashMap<String, Arc<AtomicBool>>,
    scripts: HashMap<Vec<String>, ScriptedExec>,
    execs: HashMap<String, ScriptedExec>,
    failing: HashMap<&'static str, EngineError>,
    calls: Vec<String>,
    log_requests: Vec<LogsRequest>,
    exec_specs: Vec<ExecSpec>,
    next_exec: usize,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_container(&self, name: &str, status: &str, started_at: &str) {
        self.state().containers.insert(
            name.to_string(),
            ContainerDetails {
                status: Some(status.to_string()),
                started_at: Some(started_at.to_string()),
            },
        );
    }

    pub fn set_status(&self, name: &str, status: &str) {
        if let Some(details) = self.state().containers.get_mut(name) {
            details.status = Some(status.to_string());
        }
    }

    pub fn remove_container_entry(&self, name: &str) {
        self.state().containers.remove(name);
    }

    pub fn set_logs(&self, name: &str, frames: Vec<OutputFrame>) {
        self.state().logs.insert(name.to_string(), frames);
    }

    pub fn truncate_logs(&self, name: &str, by: usize) {
        self.state().truncated_logs.insert(name.to_string(), by);
    }

    /// Feed for the next follow request; the returned sender pushes frames
    pub fn follow_feed(&self, name: &str) -> mpsc::UnboundedSender<Result<OutputFrame, EngineError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().follow_feeds.insert(name.to_string(), rx);
        tx
    }

    pub fn script(&self, cmd: &[&str], exec: ScriptedExec) {
        let cmd = cmd.iter().map(|s| s.to_string()).collect();
        self.state().scripts.insert(cmd, exec);
    }

    /// Make one engine operation fail with `err`
    pub fn fail(&self, op: &'static str, err: EngineError) {
        self.state().failing.insert(op, err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn log_requests(&self) -> Vec<LogsRequest> {
        self.state().log_requests.clone()
    }

    pub fn exec_specs(&self) -> Vec<ExecSpec> {
        self.state().exec_specs.clone()
    }

    fn check(&self, op: &'static str, target: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        state.calls.push(format!("{} {}", op, target));
        if let Some(err) = state.failing.get(op) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn require_container(&self, name: &str) -> Result<ContainerDetails, EngineError> {
        self.state()
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", name)))
    }
}

fn wire_stream(frames: &[OutputFrame], truncate_by: usize) -> FrameStream {
    let mut wire = encode_frames(frames);
    wire.truncate(wire.len().saturating_sub(truncate_by));
    decode_multiplexed(Cursor::new(wire))
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn start_container(&self, name: &str) -> Result<(), EngineError> {
        self.check("start", name)?;
        self.require_container(name)?;
        self.set_status(name, "running");
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<(), EngineError> {
        self.check("stop", name)?;
        self.require_container(name)?;
        self.set_status(name, "exited");
        Ok(())
    }

    async fn restart_container(&self, name: &str) -> Result<(), EngineError> {
        self.check("restart", name)?;
        self.require_container(name)?;
        self.set_status(name, "running");
        Ok(())
    }

    async fn remove_container(
        &self,
        name: &str,
        options: RemoveOptions,
    ) -> Result<(), EngineError> {
        self.check("remove", name)?;
        self.state().calls.push(format!(
            "remove options volumes={} force={}",
            options.remove_volumes, options.force
        ));
        self.require_container(name)?;
        self.remove_container_entry(name);
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerDetails, EngineError> {
        self.check("inspect", name)?;
        self.require_container(name)
    }

    async fn logs(&self, name: &str, request: LogsRequest) -> Result<FrameStream, EngineError> {
        self.check("logs", name)?;
        self.require_container(name)?;

        let mut state = self.state();
        state.log_requests.push(request.clone());

        if request.follow {
            let rx = state
                .follow_feeds
                .remove(name)
                .ok_or_else(|| EngineError::Api("no follow feed prepared".to_string()))?;
            let closed = state
                .follow_closed
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                .clone();
            closed.store(false, Ordering::SeqCst);
            let guard = DropFlag(closed);
            let stream = UnboundedReceiverStream::new(rx).map(move |item| {
                let _keep = &guard;
                item
            });
            return Ok(Box::pin(stream));
        }

        let frames = state.logs.get(name).cloned().unwrap_or_default();
        let frames = match request.tail.parse::<usize>() {
            Ok(n) => frames[frames.len().saturating_sub(n)..].to_vec(),
            Err(_) => frames,
        };
        let truncate_by = state.truncated_logs.get(name).copied().unwrap_or(0);
        Ok(wire_stream(&frames, truncate_by))
    }

    async fn create_exec(&self, name: &str, spec: ExecSpec) -> Result<String, EngineError> {
        self.check("create_exec", name)?;
        self.require_container(name)?;

        let mut state = self.state();
        state.exec_specs.push(spec.clone());
        let script = state.scripts.get(&spec.cmd).cloned().unwrap_or_else(|| {
            ScriptedExec::new(
                vec![stderr(&format!("{}: command not found\n", spec.cmd[0]))],
                127,
            )
        });
        state.next_exec += 1;
        let id = format!("exec-{}", state.next_exec);
        state.execs.insert(id.clone(), script);
        Ok(id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<FrameStream, EngineError> {
        self.check("start_exec", exec_id)?;
        let script = self
            .state()
            .execs
            .get(exec_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(exec_id.to_string()))?;
        Ok(wire_stream(&script.output, script.truncate_by))
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<Option<i64>, EngineError> {
        self.check("inspect_exec", exec_id)?;
        self.state()
            .execs
            .get(exec_id)
            .map(|script| script.exit_code)
            .ok_or_else(|| EngineError::NotFound(exec_id.to_string()))
    }
}

impl FakeEngine {
    /// Whether the engine side of the last follow stream for `name` was closed
    pub fn follow_stream_closed(&self, name: &str) -> bool {
        self.state()
            .follow_closed
            .get(name)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// A service named `name` on the test network backed by `engine`
pub fn service(name: &str, engine: Arc<FakeEngine>) -> Service {
    Service::new(name, ServiceContext::new(NETWORK), engine, &LauncherConfig::default())
}

pub fn service_with(name: &str, engine: Arc<FakeEngine>, launcher: &LauncherConfig) -> Service {
    Service::new(name, ServiceContext::new(NETWORK), engine, launcher)
}
