//! Configuration types and loading.
//!
//! This module provides the per-session transport settings: request timeout,
//! framing mode, Content-Length unit, and process/stream policies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lsp::{FramingMode, LengthUnit};

/// Environment variable pointing at a configuration file.
pub const CONFIG_ENV_VAR: &str = "LSPWIRE_CONFIG";

/// File name searched in the working and user config directories.
pub const CONFIG_FILE_NAME: &str = "lspwire.toml";

/// What happens to the server's standard error stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StderrMode {
    /// Share the parent's stderr.
    #[default]
    Inherit,
    /// Discard everything the server writes to stderr.
    Null,
}

/// Settings for one client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Default request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How incoming frames are delimited.
    #[serde(default)]
    pub framing: FramingMode,

    /// Unit used for the outgoing `Content-Length` header.
    #[serde(default)]
    pub length_unit: LengthUnit,

    /// Fail pending requests as soon as the server output closes instead of
    /// letting them time out.
    #[serde(default = "default_fail_pending_on_exit")]
    pub fail_pending_on_exit: bool,

    /// Largest body accepted from the server, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Capacity of the session event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Server stderr handling.
    #[serde(default)]
    pub stderr: StderrMode,
}

const fn default_request_timeout_ms() -> u64 {
    1000
}

const fn default_fail_pending_on_exit() -> bool {
    true
}

const fn default_max_message_bytes() -> usize {
    64 * 1024 * 1024
}

const fn default_event_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            framing: FramingMode::default(),
            length_unit: LengthUnit::default(),
            fail_pending_on_exit: default_fail_pending_on_exit(),
            max_message_bytes: default_max_message_bytes(),
            event_capacity: default_event_capacity(),
            stderr: StderrMode::default(),
        }
    }
}

impl ClientConfig {
    /// Default request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Load configuration from the default locations.
    ///
    /// Paths checked in order:
    /// 1. `$LSPWIRE_CONFIG` environment variable
    /// 2. `./lspwire.toml` (current directory)
    /// 3. `<config dir>/lspwire/lspwire.toml`
    ///
    /// Falls back to [`ClientConfig::default`] when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read, parsed, or fails
    /// validation.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_from(Path::new(&path));
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Self::load_from(&local_config);
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                return Self::load_from(&user_config);
            }
        }

        tracing::debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, parsing fails, or a value
    /// is out of range.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Per-user configuration file location.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lspwire").join(CONFIG_FILE_NAME))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero timeouts, sizes, or
    /// capacities.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_message_bytes must be greater than zero".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
