//! LSP client implementation.
//!
//! This module drives a language server over JSON-RPC 2.0 on its stdio:
//! framing, request correlation, session events, and process lifecycle.

mod client;
pub mod codec;
mod dispatcher;
mod events;
mod lifecycle;
mod pending;
mod transport;
pub mod types;

pub use client::LspClient;
pub use codec::{FrameError, FrameReader, FramingMode, LengthUnit};
pub use events::{EventBus, SessionEvent};
pub use lifecycle::SessionState;
pub use types::{
    InboundMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
