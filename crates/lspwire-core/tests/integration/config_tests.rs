use std::time::Duration;

use anyhow::Result;
use lspwire_core::lsp::{FramingMode, LengthUnit};
use lspwire_core::{ClientConfig, Error, StderrMode};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::common::mock_lsp::{MockBehavior, MockLspServer};

#[test]
fn test_config_file_overrides_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("lspwire.toml");
    std::fs::write(
        &path,
        r#"
request_timeout_ms = 2500
framing = "lines"
length_unit = "chars"
stderr = "null"
"#,
    )?;

    let config = ClientConfig::load_from(&path)?;

    assert_eq!(config.request_timeout(), Duration::from_millis(2500));
    assert_eq!(config.framing, FramingMode::Lines);
    assert_eq!(config.length_unit, LengthUnit::Chars);
    assert_eq!(config.stderr, StderrMode::Null);
    assert!(config.fail_pending_on_exit);
    Ok(())
}

#[test]
fn test_invalid_config_file_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("lspwire.toml");
    std::fs::write(&path, "framing = \"xml\"\n")?;

    assert!(matches!(
        ClientConfig::load_from(&path),
        Err(Error::Toml(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_loaded_timeout_applies_to_requests() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("lspwire.toml");
    std::fs::write(&path, "request_timeout_ms = 30\n")?;
    let config = ClientConfig::load_from(&path)?;

    let (client, _server) = MockLspServer::new()
        .on_method("slow", MockBehavior::Silent)
        .connect(&config);

    match client.request::<_, Value>("slow", json!({})).await {
        Err(Error::Timeout { timeout_ms, .. }) => assert_eq!(timeout_ms, 30),
        other => panic!("Expected Timeout, got {other:?}"),
    }
    Ok(())
}
