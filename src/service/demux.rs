//! Stream demultiplexing
//!
//! Engine output arrives as frames tagged stdout/stderr. This module turns a
//! frame stream into one ordered byte stream by pumping payloads into an
//! in-memory pipe from a spawned task, then offers two ways to consume it:
//! [`capture`] drains everything into a buffer, [`LineReader`] pulls
//! newline-framed text lines.

use bytes::Bytes;
use futures_util::future::{self, Future};
use futures_util::{stream, StreamExt};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use super::engine::{FrameStream, OutputFrame, StreamKind};
use super::error::EngineError;

/// Capacity of the in-memory pipe between pump and consumer
pub const PIPE_CAPACITY: usize = 64 * 1024;

const HEADER_LEN: usize = 8;

/// Decode the engine's raw multiplexed wire format.
///
/// Each frame is an 8 byte header (stream type, three zero bytes, big-endian
/// payload length) followed by the payload. A clean EOF between frames ends
/// the stream; EOF anywhere else is reported as a truncated frame.
pub fn decode_multiplexed<R>(reader: R) -> FrameStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => Some((Ok(frame), Some(reader))),
            Ok(None) => None,
            Err(err) => Some((Err(err), None)),
        }
    }))
}

async fn read_frame<R>(reader: &mut R) -> Result<Option<OutputFrame>, EngineError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = reader
                .read(&mut header[filled..])
                .await
                .map_err(|e| EngineError::Stream(e.to_string()))?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(EngineError::Stream(format!(
                    "truncated frame header ({} of {} bytes)",
                    filled, HEADER_LEN
                )));
            }
            filled += n;
        }

        let kind = match header[0] {
            0 => StreamKind::Stdin,
            1 => StreamKind::Stdout,
            2 => StreamKind::Stderr,
            other => {
                return Err(EngineError::Stream(format!("unknown stream type {}", other)));
            }
        };
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if len == 0 {
            continue;
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                EngineError::Stream(format!("truncated frame payload (expected {} bytes)", len))
            } else {
                EngineError::Stream(e.to_string())
            }
        })?;

        return Ok(Some(OutputFrame::new(kind, Bytes::from(payload))));
    }
}

/// Spawn a task copying frame payloads, in arrival order, into a pipe.
///
/// The returned reader observes EOF once the source ends or fails; the
/// task's result tells the two apart.
pub fn pump(frames: FrameStream) -> (DuplexStream, JoinHandle<Result<(), EngineError>>) {
    pump_until(frames, future::pending::<()>())
}

/// Like [`pump`], but stops as soon as `stop` resolves. The frame stream is
/// dropped on stop, which closes it on the engine side.
pub fn pump_until<F>(
    frames: FrameStream,
    stop: F,
) -> (DuplexStream, JoinHandle<Result<(), EngineError>>)
where
    F: Future<Output = ()> + Send + 'static,
{
    let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

    let task = tokio::spawn(async move {
        let mut frames = frames;
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    log::debug!("Stream pump stopped by cancellation");
                    return Ok(());
                }
                next = frames.next() => match next {
                    Some(Ok(frame)) => {
                        tokio::select! {
                            biased;
                            _ = &mut stop => {
                                log::debug!("Stream pump stopped by cancellation");
                                return Ok(());
                            }
                            written = writer.write_all(&frame.data) => {
                                if written.is_err() {
                                    log::debug!("Pipe reader dropped, stopping stream pump");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                }
            }
        }
    });

    (reader, task)
}

/// Wait for a pump task and surface its outcome
pub async fn join_pump(task: JoinHandle<Result<(), EngineError>>) -> Result<(), EngineError> {
    task.await
        .map_err(|e| EngineError::Stream(format!("stream pump task failed: {}", e)))?
}

/// Drain all frames into one buffer, stdout and stderr interleaved as received
pub async fn capture(frames: FrameStream) -> Result<Vec<u8>, EngineError> {
    let (mut reader, task) = pump(frames);

    let mut buf = Vec::new();
    let read = reader.read_to_end(&mut buf).await;
    join_pump(task).await?;
    read.map_err(|e| EngineError::Stream(e.to_string()))?;

    Ok(buf)
}

/// Splits a byte stream into lines, dropping `\n` or `\r\n` terminators.
///
/// Invalid UTF-8 is replaced rather than rejected; a final line without a
/// terminator is still returned.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next line, or `None` at end of stream
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}
