//! Tests against real child processes.

use std::time::Duration;

use anyhow::Result;
use lspwire_core::{ClientConfig, Error, EventBus, LspClient, SessionEvent, SessionState, StderrMode};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::TryRecvError;

fn quiet_config() -> ClientConfig {
    ClientConfig {
        request_timeout_ms: 500,
        stderr: StderrMode::Null,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_exit_is_published_exactly_once() -> Result<()> {
    let config = quiet_config();
    let events = EventBus::new(config.event_capacity);
    let mut rx = events.subscribe();

    let client = LspClient::start_with_events(&["sh", "-c", "exit 0"], &config, events)?;
    assert!(client.pid().is_some());

    assert_eq!(
        client.wait_for_exit().await,
        SessionState::Exited { code: Some(0) }
    );
    assert_eq!(rx.recv().await?, SessionEvent::Exit { code: Some(0) });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    Ok(())
}

#[tokio::test]
async fn test_exit_code_is_reported() -> Result<()> {
    let client = LspClient::start(&["sh", "-c", "exit 3"], &quiet_config())?;

    let state = client.wait_for_exit().await;
    assert_eq!(state.exit_code(), Some(3));
    assert!(!client.is_alive());
    Ok(())
}

#[tokio::test]
async fn test_missing_executable_fails_to_start() {
    let result = LspClient::start(&["lspwire-definitely-missing"], &quiet_config());
    assert!(matches!(result, Err(Error::SpawnFailed { .. })));
}

#[tokio::test]
async fn test_empty_command_fails_to_start() {
    let argv: Vec<String> = Vec::new();
    let result = LspClient::start(&argv[..], &quiet_config());
    assert!(matches!(result, Err(Error::EmptyCommand)));
}

#[tokio::test]
async fn test_echoed_message_is_published_as_input() -> Result<()> {
    let client = LspClient::start(&["cat"], &quiet_config())?;
    let mut events = client.subscribe();

    let message = json!({"jsonrpc": "2.0", "method": "$/echo", "params": {"text": "héllo"}});
    client.send(&message).await?;

    // The echo may be read before the write is reported.
    let received = [events.recv().await?, events.recv().await?];
    assert!(received.contains(&SessionEvent::Output(message.clone())));
    assert!(received.contains(&SessionEvent::Input(message)));

    client.terminate();
    Ok(())
}

#[tokio::test]
async fn test_terminate_kills_server() -> Result<()> {
    let client = LspClient::start(&["cat"], &quiet_config())?;
    assert!(client.is_alive());

    client.terminate();

    let state = tokio::time::timeout(Duration::from_secs(5), client.wait_for_exit()).await?;
    assert!(!state.is_running());
    assert!(matches!(
        client.notify("exit", ()).await,
        Err(Error::ServerTerminated)
    ));
    Ok(())
}

#[tokio::test]
async fn test_server_exit_fails_pending_request() -> Result<()> {
    let client = LspClient::start(&["sh", "-c", "read -r _"], &quiet_config())?;

    let result = client
        .request_with_timeout::<_, Value>("initialize", json!({}), Duration::from_secs(5))
        .await;

    assert!(matches!(result, Err(Error::ServerTerminated)));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}
