//! Log retrieval: bounded snapshots and live following

use std::fmt;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use super::demux::{self, LineReader};
use super::engine::{ContainerEngine, LogsRequest};
use super::error::{Result, ServiceError};

/// Buffered lines between the follow task and its consumer
pub const FOLLOW_CHANNEL_CAPACITY: usize = 256;

/// An item delivered by [`LogFollower`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Line(String),
    /// Always the last item; the channel closes right after it
    EndOfStream,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLine::Line(line) => f.write_str(line),
            LogLine::EndOfStream => f.write_str("--- end of stream ---"),
        }
    }
}

/// Stops a log follower. Dropping the handle has the same effect as
/// calling [`CancelHandle::cancel`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    fn is_cancelled(&self) -> bool {
        let handle_dropped = self.rx.has_changed().is_err();
        handle_dropped || *self.rx.borrow()
    }

    /// Resolves on cancel or when the handle is dropped
    async fn cancelled(mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// A live log tail: lines arrive in production order, then one
/// [`LogLine::EndOfStream`], then the channel closes.
#[derive(Debug)]
pub struct LogFollower {
    lines: mpsc::Receiver<LogLine>,
    cancel: CancelHandle,
}

impl LogFollower {
    /// Next item, or `None` once the channel is closed
    pub async fn next(&mut self) -> Option<LogLine> {
        self.lines.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn into_parts(self) -> (mpsc::Receiver<LogLine>, CancelHandle) {
        (self.lines, self.cancel)
    }

    pub fn into_stream(self) -> (ReceiverStream<LogLine>, CancelHandle) {
        (ReceiverStream::new(self.lines), self.cancel)
    }
}

/// Collect the container's current logs as lines.
///
/// A source failure after the stream opened is returned as an error rather
/// than as a silently shortened list.
pub async fn get_logs(
    engine: &dyn ContainerEngine,
    container: &str,
    since: &str,
    tail: &str,
) -> Result<Vec<String>> {
    let request = LogsRequest {
        since: since.to_string(),
        tail: tail.to_string(),
        follow: false,
    };
    let frames = engine
        .logs(container, request)
        .await
        .map_err(|e| ServiceError::engine("get logs", container, e))?;

    let (reader, pump_task) = demux::pump(frames);
    let mut lines = LineReader::new(BufReader::new(reader));
    let mut collected = Vec::new();

    let read = loop {
        match lines.next_line().await {
            Ok(Some(line)) => collected.push(line),
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    drop(lines);

    demux::join_pump(pump_task)
        .await
        .map_err(|e| ServiceError::engine("read logs", container, e))?;
    read?;

    log::debug!("Collected {} log lines from {}", collected.len(), container);
    Ok(collected)
}

/// Start following the container's logs.
///
/// Returns once the engine has accepted the request; lines are produced by
/// a spawned task. Cancel (or drop the cancel handle) to release the stream.
pub async fn follow_logs(
    engine: &dyn ContainerEngine,
    container: &str,
    since: &str,
    tail: &str,
) -> Result<LogFollower> {
    let request = LogsRequest {
        since: since.to_string(),
        tail: tail.to_string(),
        follow: true,
    };
    let frames = engine
        .logs(container, request)
        .await
        .map_err(|e| ServiceError::engine("follow logs", container, e))?;

    let (cancel, token) = CancelToken::pair();
    let (reader, pump_task) = demux::pump_until(frames, token.clone().cancelled());
    let (tx, rx) = mpsc::channel(FOLLOW_CHANNEL_CAPACITY);
    let container = container.to_string();

    tokio::spawn(async move {
        let mut lines = LineReader::new(BufReader::new(reader));

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Reading log stream of {} failed: {}", container, e);
                    break;
                }
            };
            if token.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                _ = token.clone().cancelled() => break,
                sent = tx.send(LogLine::Line(line)) => {
                    if sent.is_err() {
                        log::debug!("Log follower for {} dropped its receiver", container);
                        break;
                    }
                }
            }
        }
        drop(lines);

        if let Err(e) = demux::join_pump(pump_task).await {
            log::warn!("Log stream of {} ended with error: {}", container, e);
        }
        let _ = tx.send(LogLine::EndOfStream).await;
        log::debug!("Stopped following logs of {}", container);
    });

    Ok(LogFollower { lines: rx, cancel })
}
