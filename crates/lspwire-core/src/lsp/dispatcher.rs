//! Routing of decoded server messages.

use serde_json::Value;
use tracing::{debug, warn};

use crate::lsp::events::{EventBus, SessionEvent};
use crate::lsp::pending::PendingRequests;
use crate::lsp::types::{InboundMessage, JsonRpcResponse};

/// Classifies incoming messages and routes them to waiters and subscribers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pending: PendingRequests,
    events: EventBus,
}

impl Dispatcher {
    /// Create a dispatcher resolving entries of `pending` and publishing on
    /// `events`.
    #[must_use]
    pub const fn new(pending: PendingRequests, events: EventBus) -> Self {
        Self { pending, events }
    }

    /// Handle one decoded message.
    ///
    /// Every message is published as [`SessionEvent::Input`]; responses
    /// additionally resolve their pending request and are published as
    /// [`SessionEvent::Response`].
    pub fn dispatch(&self, value: Value) {
        if self.events.subscriber_count() > 0 {
            self.events.publish(SessionEvent::Input(value.clone()));
        }

        match InboundMessage::classify(value) {
            Ok(InboundMessage::Response(response)) => self.resolve(response),
            Ok(InboundMessage::Request(request)) => {
                debug!(
                    method = %request.method,
                    id = %request.id,
                    "server request left to subscribers"
                );
            }
            Ok(InboundMessage::Notification(notification)) => {
                debug!(method = %notification.method, "server notification");
            }
            Err(e) => warn!(error = %e, "discarding unclassifiable message"),
        }
    }

    fn resolve(&self, response: JsonRpcResponse) {
        let JsonRpcResponse {
            id, result, error, ..
        } = response;

        let outcome = match (result, error) {
            (Some(result), error) => {
                if error.is_some() {
                    warn!(id = %id, "response carries both result and error, using result");
                }
                Ok(result)
            }
            (None, Some(error)) => Err(error),
            (None, None) => return,
        };

        if !self.pending.complete(&id, outcome.clone()) {
            debug!(id = %id, "dropping response with no pending request");
        }
        self.events.publish(SessionEvent::Response { id, outcome });
    }
}
