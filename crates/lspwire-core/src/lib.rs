//! # lspwire-core
//!
//! Client-side transport for talking to a language server over stdio.
//!
//! A [`LspClient`] spawns the server, frames outgoing JSON-RPC messages with
//! `Content-Length` headers, parses the server's output stream, and matches
//! responses to the requests that caused them. Every message in either
//! direction, plus the server's exit, is published on an [`EventBus`].
//!
//! ## Architecture
//!
//! - [`lsp`] - framing, correlation, session events, and the client itself
//! - [`config`] - client settings and their loading
//! - [`error`] - error types for the library
//!
//! ## Example
//!
//! ```rust,ignore
//! use lspwire_core::{ClientConfig, LspClient};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lspwire_core::Error> {
//!     let config = ClientConfig::load()?;
//!     let client = LspClient::start(&["rust-analyzer"], &config)?;
//!     let result: Value = client
//!         .request("initialize", json!({"processId": null, "capabilities": {}}))
//!         .await?;
//!     println!("{result}");
//!     client.terminate();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lsp;

pub use config::{ClientConfig, StderrMode};
pub use error::{Error, Result};
pub use lsp::{EventBus, LspClient, SessionEvent, SessionState};
