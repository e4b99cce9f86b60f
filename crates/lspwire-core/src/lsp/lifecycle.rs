//! Client session lifecycle.
//!
//! A session is `Running` from spawn until the server terminates, then
//! `Exited` for good: there is no restart. The transition happens exactly
//! once and is the only place the `exit` event is published.

use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::lsp::events::{EventBus, SessionEvent};

/// State of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Server is running and accepts messages.
    Running,
    /// Server has terminated.
    Exited {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },
}

impl SessionState {
    /// Check if the session can still send messages.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Exit code of a terminated server.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Running => None,
            Self::Exited { code } => *code,
        }
    }
}

/// Owner of the `Running -> Exited` transition.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    state: Arc<watch::Sender<SessionState>>,
    events: EventBus,
}

impl Lifecycle {
    /// Create a running lifecycle and a receiver observing it.
    pub(crate) fn new(events: EventBus) -> (Self, watch::Receiver<SessionState>) {
        let (state, receiver) = watch::channel(SessionState::Running);
        (
            Self {
                state: Arc::new(state),
                events,
            },
            receiver,
        )
    }

    /// Move to `Exited` and publish the exit event.
    ///
    /// Returns `false` if the session had already exited.
    pub(crate) fn mark_exited(&self, code: Option<i32>) -> bool {
        let transitioned = self.state.send_if_modified(|state| {
            if state.is_running() {
                *state = SessionState::Exited { code };
                true
            } else {
                false
            }
        });

        if transitioned {
            info!(?code, "language server session ended");
            self.events.publish(SessionEvent::Exit { code });
        }
        transitioned
    }
}

/// Wait for `child` to terminate, killing it first if `kill` fires or its
/// sender is dropped, then mark the session exited.
pub(crate) async fn watch_process(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    lifecycle: Lifecycle,
) {
    let pid = child.id();

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill => None,
    };

    let status = match status {
        Some(status) => status,
        None => {
            debug!(?pid, "terminating language server");
            if let Err(e) = child.kill().await {
                warn!(?pid, error = %e, "failed to kill language server");
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) if status.success() => {
            debug!(?pid, "language server exited");
            status.code()
        }
        Ok(status) => {
            warn!(?pid, %status, "language server exited abnormally");
            status.code()
        }
        Err(e) => {
            error!(?pid, error = %e, "failed to wait for language server");
            None
        }
    };

    lifecycle.mark_exited(code);
}
