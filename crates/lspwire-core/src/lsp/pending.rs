//! Table of requests awaiting a response.
//!
//! Each entry owns a single-use completion handle. Removing the entry is the
//! one and only terminal transition: whoever removes it decides the outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::lsp::types::{JsonRpcError, RequestId};

/// Outcome delivered to a waiting request.
pub type Completion = Result<Value, JsonRpcError>;

/// A request awaiting its response.
#[derive(Debug)]
pub struct PendingRequest {
    /// Method of the request, kept for diagnostics.
    pub method: String,
    /// When the request was registered.
    pub created_at: Instant,
    sender: oneshot::Sender<Completion>,
}

/// Shared id -> pending request table.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<RequestId, PendingRequest>>>,
}

impl PendingRequests {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<RequestId, PendingRequest>> {
        // Entries stay consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` and return the receiving end of its completion handle.
    pub fn register(&self, id: RequestId, method: &str) -> oneshot::Receiver<Completion> {
        let (sender, receiver) = oneshot::channel();
        let entry = PendingRequest {
            method: method.to_string(),
            created_at: Instant::now(),
            sender,
        };
        self.table().insert(id, entry);
        receiver
    }

    /// Resolve `id` with `outcome`.
    ///
    /// Returns `false` if nothing is waiting for `id` (never requested, timed
    /// out, or already resolved).
    pub fn complete(&self, id: &RequestId, outcome: Completion) -> bool {
        let Some(entry) = self.table().remove(id) else {
            return false;
        };
        debug!(
            id = %id,
            method = %entry.method,
            elapsed = ?entry.created_at.elapsed(),
            "request completed"
        );
        // The waiter may have been dropped in the meantime.
        entry.sender.send(outcome).is_ok()
    }

    /// Remove `id` without resolving it.
    pub fn remove(&self, id: &RequestId) -> Option<PendingRequest> {
        self.table().remove(id)
    }

    /// Drop every entry. Waiters observe a closed channel.
    pub fn fail_all(&self) -> usize {
        let mut table = self.table();
        let count = table.len();
        for (id, entry) in table.drain() {
            debug!(id = %id, method = %entry.method, "abandoning pending request");
        }
        count
    }

    /// Number of requests currently waiting.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no request is waiting.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}
