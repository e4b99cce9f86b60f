//! Command-line argument parsing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lspwire_core::ClientConfig;
use lspwire_core::lsp::FramingMode;
use serde_json::Value;

/// Language server probe
///
/// Starts a language server, sends it one request or notification over
/// stdio, prints the result as JSON, and shuts the server down.
#[derive(Debug, Parser)]
#[command(name = "lspwire")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, searches for lspwire.toml in:
    /// 1. $LSPWIRE_CONFIG environment variable
    /// 2. Current directory
    /// 3. ~/.config/lspwire/lspwire.toml
    #[arg(short, long, value_name = "FILE", env = "LSPWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    ///
    /// Valid values: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info", env = "LSPWIRE_LOG")]
    pub log_level: String,

    /// Output logs as JSON (for structured logging)
    #[arg(long, default_value = "false", env = "LSPWIRE_LOG_JSON")]
    pub log_json: bool,

    /// Request timeout in milliseconds, overriding the configuration
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// How the server delimits its output, overriding the configuration
    #[arg(long, value_enum)]
    pub framing: Option<Framing>,

    /// Send a notification instead of a request
    #[arg(long)]
    pub notify: bool,

    /// Message params as JSON
    #[arg(short, long, value_name = "JSON", default_value = "{}")]
    pub params: String,

    /// Log every message sent to and received from the server
    #[arg(long)]
    pub trace: bool,

    /// JSON-RPC method to call
    pub method: String,

    /// Language server command line
    #[arg(last = true, required = true, value_name = "SERVER")]
    pub server: Vec<String>,
}

/// Framing accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// `Content-Length` headers
    Headers,
    /// One JSON body per line
    Lines,
}

impl From<Framing> for FramingMode {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::Headers => Self::Headers,
            Framing::Lines => Self::Lines,
        }
    }
}

impl Args {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(timeout_ms) = self.timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
        if let Some(framing) = self.framing {
            config.framing = framing.into();
        }
    }

    /// Parse `--params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not valid JSON.
    pub fn params(&self) -> Result<Value> {
        serde_json::from_str(&self.params).context("invalid --params JSON")
    }
}
