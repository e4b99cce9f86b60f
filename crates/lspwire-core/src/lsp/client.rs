//! LSP client session and request correlation.

use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::lsp::codec::{self, FrameReader};
use crate::lsp::dispatcher::Dispatcher;
use crate::lsp::events::{EventBus, SessionEvent};
use crate::lsp::lifecycle::{self, Lifecycle, SessionState};
use crate::lsp::pending::PendingRequests;
use crate::lsp::transport::{self, FrameWriter};
use crate::lsp::types::{JSONRPC_VERSION, JsonRpcNotification, JsonRpcRequest, RequestId};

/// One connection to a running language server.
///
/// Cloning is cheap and every clone drives the same session, so requests can
/// be issued concurrently from many tasks. Dropping the last clone kills the
/// server process.
#[derive(Debug, Clone)]
pub struct LspClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    writer: FrameWriter,
    pending: PendingRequests,
    events: EventBus,
    lifecycle: Lifecycle,
    state: watch::Receiver<SessionState>,
    output_closed: Arc<AtomicBool>,
    next_id: AtomicI64,
    pid: Option<u32>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
    reader: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a pending entry when the waiting request goes away, whatever the
/// reason (timeout, write failure, or the future being dropped).
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl LspClient {
    /// Spawn `argv` as a language server and start a session on its stdio.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid, `argv` is empty, or the
    /// process cannot be spawned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start<S: AsRef<OsStr>>(argv: &[S], config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Self::start_with_events(argv, config, EventBus::new(config.event_capacity))
    }

    /// Like [`LspClient::start`], publishing on a caller-provided bus so that
    /// subscriptions made beforehand observe every event.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid, `argv` is empty, or the
    /// process cannot be spawned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_with_events<S: AsRef<OsStr>>(
        argv: &[S],
        config: &ClientConfig,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let mut child = transport::spawn_process(argv, config.stderr)?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("failed to capture stdout".to_string()))?;

        let (lifecycle, state) = Lifecycle::new(events.clone());
        let (kill, kill_rx) = oneshot::channel();
        tokio::spawn(lifecycle::watch_process(child, kill_rx, lifecycle.clone()));

        debug!(?pid, "language server session started");
        Ok(Self::connect(
            stdout,
            stdin,
            config,
            events,
            (lifecycle, state),
            Session::Process { pid, kill },
        ))
    }

    /// Run a session over arbitrary byte streams instead of a child process.
    ///
    /// `reader` carries server output, `writer` server input. The session
    /// exits, publishing [`SessionEvent::Exit`] with no code, when `reader`
    /// reaches EOF or fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn from_streams<R, W>(
        reader: R,
        writer: W,
        config: &ClientConfig,
        events: EventBus,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        config.validate()?;
        let lifecycle = Lifecycle::new(events.clone());
        Ok(Self::connect(
            reader,
            writer,
            config,
            events,
            lifecycle,
            Session::Streams,
        ))
    }

    fn connect<R, W>(
        reader: R,
        writer: W,
        config: &ClientConfig,
        events: EventBus,
        (lifecycle, state): (Lifecycle, watch::Receiver<SessionState>),
        session: Session,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending = PendingRequests::new();
        let output_closed = Arc::new(AtomicBool::new(false));
        let frames = FrameReader::new(
            BufReader::new(reader),
            config.framing,
            config.max_message_bytes,
        );

        let reader = tokio::spawn({
            let dispatcher = Dispatcher::new(pending.clone(), events.clone());
            let pending = pending.clone();
            let output_closed = Arc::clone(&output_closed);
            let lifecycle = lifecycle.clone();
            let fail_pending = config.fail_pending_on_exit;
            let exit_on_close = matches!(session, Session::Streams);
            async move {
                let end = transport::read_loop(frames, dispatcher).await;
                output_closed.store(true, Ordering::SeqCst);
                if fail_pending {
                    let failed = pending.fail_all();
                    if failed > 0 {
                        debug!(failed, ?end, "failing requests, server output closed");
                    }
                }
                if exit_on_close {
                    lifecycle.mark_exited(None);
                }
            }
        });

        let (pid, kill) = match session {
            Session::Process { pid, kill } => (pid, Some(kill)),
            Session::Streams => (None, None),
        };

        Self {
            inner: Arc::new(Inner {
                config: config.clone(),
                writer: FrameWriter::spawn(writer),
                pending,
                events,
                lifecycle,
                state,
                output_closed,
                next_id: AtomicI64::new(1),
                pid,
                kill: Mutex::new(kill),
                reader,
            }),
        }
    }

    /// Send a request and wait for its result, using the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestFailed`] if the server answers with an error,
    /// [`Error::Timeout`] if no answer arrives in time,
    /// [`Error::ServerTerminated`] if the session ends first, and
    /// serialization or write errors otherwise.
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request_with_timeout(method, params, self.inner.config.request_timeout())
            .await
    }

    /// Send a request and wait at most `timeout` for its result.
    ///
    /// On timeout the request is abandoned: nothing is sent to the server and
    /// a late response is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`LspClient::request`].
    pub async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = to_params(params)?;
        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let completion = self.inner.pending.register(id.clone(), method);
        let _guard = PendingGuard {
            pending: &self.inner.pending,
            id: id.clone(),
        };
        if self.inner.config.fail_pending_on_exit
            && self.inner.output_closed.load(Ordering::SeqCst)
        {
            return Err(Error::ServerTerminated);
        }

        debug!(method, id = %id, "sending request");
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let exchange = async {
            self.send(&request).await?;
            completion.await.map_err(|_| {
                debug!(method, id = %id, "session closed while waiting for response");
                Error::ServerTerminated
            })
        };

        // One deadline covers both the write and the wait.
        let outcome = match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(method, id = %id, ?timeout, "request timed out");
                return Err(timeout_error(method, timeout));
            }
        };

        Ok(serde_json::from_value(outcome?)?)
    }

    /// Send a notification. No response is expected.
    ///
    /// The write is bounded by the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the server does not take the message in
    /// time, otherwise serialization or write errors.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        let notification = JsonRpcNotification::new(method, to_params(params)?);
        let timeout = self.inner.config.request_timeout();
        debug!(method, "sending notification");

        match tokio::time::timeout(timeout, self.send(&notification)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(method, ?timeout, "notification write timed out");
                Err(timeout_error(method, timeout))
            }
        }
    }

    /// Write one message, waiting until it is flushed, then publish it as
    /// [`SessionEvent::Output`].
    ///
    /// `"jsonrpc": "2.0"` is set on every object message. There is no
    /// deadline; dropping the future before the writer reaches the frame
    /// drops the frame unwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerTerminated`] once the server has exited,
    /// otherwise serialization or write errors.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::ServerTerminated);
        }

        let mut value = serde_json::to_value(message)?;
        if let Value::Object(map) = &mut value {
            map.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));
        }

        let frame = codec::encode_frame(&value, self.inner.config.length_unit)?;
        trace!(frame = %String::from_utf8_lossy(&frame), "sending frame");
        self.inner.writer.write(frame).await?;

        self.inner.events.publish(SessionEvent::Output(value));
        Ok(())
    }

    /// Subscribe to session events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Whether the server is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state().is_running()
    }

    /// Process id of the server, if the session owns a process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.inner.pid
    }

    /// Number of requests waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Wait until the session has exited and return the final state.
    pub async fn wait_for_exit(&self) -> SessionState {
        let mut state = self.inner.state.clone();
        match state.wait_for(|state| !state.is_running()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Terminate the session.
    ///
    /// Kills the server process; the exit event follows once the process is
    /// reaped. Stream sessions stop reading and exit immediately. Calling
    /// this on an exited session does nothing.
    pub fn terminate(&self) {
        let kill = self
            .inner
            .kill
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match kill {
            Some(kill) => {
                debug!(pid = ?self.inner.pid, "terminate requested");
                // Err means the process already exited.
                let _ = kill.send(());
            }
            None if self.inner.pid.is_none() => {
                self.inner.reader.abort();
                self.inner.output_closed.store(true, Ordering::SeqCst);
                if self.inner.config.fail_pending_on_exit {
                    self.inner.pending.fail_all();
                }
                self.inner.lifecycle.mark_exited(None);
            }
            None => {}
        }
    }
}

enum Session {
    Process {
        pid: Option<u32>,
        kill: oneshot::Sender<()>,
    },
    Streams,
}

fn timeout_error(method: &str, timeout: Duration) -> Error {
    Error::Timeout {
        method: method.to_string(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Serialize params, omitting them entirely when they serialize to `null`.
fn to_params<P: Serialize>(params: P) -> Result<Option<Value>> {
    match serde_json::to_value(params)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}
