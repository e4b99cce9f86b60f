//! lspwire - language server probe
//!
//! Starts a language server, sends one JSON-RPC request or notification over
//! its stdio, and prints the result on stdout.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lspwire_core::{ClientConfig, EventBus, LspClient, SessionEvent};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

mod args;
mod logging;

use args::Args;

/// How long to wait for the server to go away after terminating it.
const EXIT_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args.log_level, args.log_json)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting lspwire");

    let mut config = if let Some(config_path) = &args.config {
        ClientConfig::load_from(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        ClientConfig::load().context("failed to load configuration")?
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let params = args.params()?;

    let events = EventBus::new(config.event_capacity);
    let tracer = args.trace.then(|| tokio::spawn(trace_events(events.subscribe())));

    let client = LspClient::start_with_events(args.server.as_slice(), &config, events)
        .context("failed to start language server")?;

    let outcome = call(&client, &args.method, params, args.notify).await;

    client.terminate();
    if tokio::time::timeout(EXIT_GRACE, client.wait_for_exit())
        .await
        .is_err()
    {
        tracing::warn!("language server did not exit in time");
    }
    if let Some(tracer) = tracer {
        // The tracer stops on its own after the exit event.
        let _ = tokio::time::timeout(EXIT_GRACE, tracer).await;
    }

    if let Some(result) = outcome? {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    tracing::info!("lspwire done");
    Ok(())
}

async fn call(
    client: &LspClient,
    method: &str,
    params: Value,
    notify: bool,
) -> Result<Option<Value>> {
    if notify {
        client
            .notify(method, params)
            .await
            .with_context(|| format!("notification '{method}' failed"))?;
        return Ok(None);
    }

    let result: Value = client
        .request(method, params)
        .await
        .with_context(|| format!("request '{method}' failed"))?;
    Ok(Some(result))
}

async fn trace_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Output(message)) => {
                tracing::info!(direction = "output", %message, "message");
            }
            Ok(SessionEvent::Input(message)) => {
                tracing::info!(direction = "input", %message, "message");
            }
            Ok(SessionEvent::Response { .. }) => {}
            Ok(SessionEvent::Exit { code }) => {
                tracing::info!(?code, "server exited");
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "trace fell behind, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
