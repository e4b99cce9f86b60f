//! Stdio transport: process spawning, serialized writes, and the read loop.
//!
//! Writes go through a single writer task so a frame is always fully written
//! and flushed before the next one starts. Reads happen in one loop that
//! dispatches each message before reading the next, preserving server order.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::config::StderrMode;
use crate::error::{Error, Result};
use crate::lsp::codec::{self, FrameReader};
use crate::lsp::dispatcher::Dispatcher;

/// Spawn a language server with piped stdin and stdout.
///
/// The child is killed when its handle is dropped.
///
/// # Errors
///
/// Returns [`Error::EmptyCommand`] if `argv` is empty and
/// [`Error::SpawnFailed`] if the process cannot be launched.
pub fn spawn_process<S: AsRef<OsStr>>(argv: &[S], stderr: StderrMode) -> Result<Child> {
    let (program, args) = argv.split_first().ok_or(Error::EmptyCommand)?;
    let command = program.as_ref().to_string_lossy().into_owned();

    info!(
        command = %command,
        args = ?args.iter().map(|a| a.as_ref().to_string_lossy()).collect::<Vec<_>>(),
        "spawning language server"
    );

    let stderr = match stderr {
        StderrMode::Inherit => Stdio::inherit(),
        StderrMode::Null => Stdio::null(),
    };

    Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::SpawnFailed { command, source: e })
}

#[derive(Debug)]
struct WriteRequest {
    frame: Vec<u8>,
    done: oneshot::Sender<std::io::Result<()>>,
}

/// Handle to the writer task owning the server's input stream.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    queue: mpsc::UnboundedSender<WriteRequest>,
}

impl FrameWriter {
    /// Start a writer task draining frames into `writer`.
    ///
    /// The task ends, closing `writer`, once every handle is dropped.
    #[must_use]
    pub fn spawn<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (queue, requests) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, requests));
        Self { queue }
    }

    /// Queue `frame` and wait until it has been written and flushed.
    ///
    /// If this future is dropped before the writer task reaches the frame,
    /// the frame is never written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails and
    /// [`Error::ServerTerminated`] if the writer task is gone.
    pub async fn write(&self, frame: Vec<u8>) -> Result<()> {
        let (done, completion) = oneshot::channel();
        self.queue
            .send(WriteRequest { frame, done })
            .map_err(|_| Error::ServerTerminated)?;
        completion.await.map_err(|_| Error::ServerTerminated)??;
        Ok(())
    }
}

async fn write_loop<W>(mut writer: W, mut requests: mpsc::UnboundedReceiver<WriteRequest>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(WriteRequest { frame, done }) = requests.recv().await {
        if done.is_closed() {
            trace!(bytes = frame.len(), "dropping frame abandoned before write");
            continue;
        }
        let result = write_frame(&mut writer, &frame).await;
        if let Err(e) = &result {
            warn!(error = %e, "write to language server failed");
        } else {
            trace!(bytes = frame.len(), "frame written");
        }
        // The caller may have given up waiting.
        let _ = done.send(result);
    }
    debug!("writer closed");
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLoopEnd {
    /// The server closed its output.
    Eof,
    /// Reading failed; nothing more will be dispatched.
    Failed,
}

/// Read frames until EOF or a stream error, dispatching each decoded message
/// in arrival order.
///
/// Malformed bodies and recoverable framing faults are logged and skipped.
pub async fn read_loop<R>(mut frames: FrameReader<R>, dispatcher: Dispatcher) -> ReadLoopEnd
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match frames.next_frame().await {
            Ok(Some(body)) => {
                trace!(body = %String::from_utf8_lossy(&body), "received frame");
                if let Some(value) = codec::decode(&body) {
                    dispatcher.dispatch(value);
                }
            }
            Ok(None) => {
                debug!("language server output closed");
                return ReadLoopEnd::Eof;
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "skipping bad frame");
            }
            Err(e) => {
                error!(error = %e, "read loop stopped");
                return ReadLoopEnd::Failed;
            }
        }
    }
}
