//! Session events published to consumers.
//!
//! Events fan out over a `tokio::sync::broadcast` channel: publishing never
//! blocks the transport, and a slow subscriber observes a lag instead of
//! stalling the read loop.

use serde_json::Value;
use tokio::sync::broadcast;

use crate::lsp::types::{JsonRpcError, RequestId};

/// Something that happened on a client session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A message was decoded from the server's output.
    Input(Value),
    /// A message was fully written to the server's input.
    Output(Value),
    /// A response for `id` was received.
    Response {
        /// Id of the answered request.
        id: RequestId,
        /// Result payload or error object.
        outcome: Result<Value, JsonRpcError>,
    },
    /// The server terminated. Emitted exactly once per session.
    Exit {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },
}

/// Publish side of the session event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Events without subscribers are dropped.
    pub fn publish(&self, event: SessionEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
