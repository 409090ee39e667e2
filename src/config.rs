//! Client configuration
//!
//! A session is configured from a TOML file with three sections:
//!
//! ```toml
//! [session]
//! endpoint = "wss://rds.example.com/ws"
//! user_id = "alice"
//! session_id = "session-42"
//!
//! [connection]
//! max_retries = 3
//! retry_delay_ms = 1000
//!
//! [messages]
//! history_limit = 100
//! ```
//!
//! Every field outside `[session]` has a default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub session: SessionSection,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub messages: MessagesSection,
}

/// Who connects, and where to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Server URL, `ws://` or `wss://`
    pub endpoint: String,
    /// Opaque caller identity, sent in the handshake
    pub user_id: String,
    /// Opaque conversation identity, sent in the handshake
    pub session_id: String,
    /// Connect as soon as the session is spawned
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

/// Reconnection and keep-alive behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// Consecutive failed attempts before giving up (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base reconnect delay in milliseconds (default: 1000)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Double the delay after every failed attempt (default: true)
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
    #[serde(default = "default_true")]
    pub reconnect_enabled: bool,
    /// Keep-alive period in milliseconds (default: 30000)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: true,
            reconnect_enabled: true,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl ConnectionSection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// History, retry queue and typing indicator limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagesSection {
    /// Messages kept in history (default: 100)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Failed messages held for retry (default: 100)
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// Typing debounce in milliseconds (default: 1000)
    #[serde(default = "default_typing_debounce_ms")]
    pub typing_debounce_ms: u64,
}

impl Default for MessagesSection {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_pending: default_max_pending(),
            typing_debounce_ms: default_typing_debounce_ms(),
        }
    }
}

impl MessagesSection {
    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_history_limit() -> usize {
    100
}

fn default_max_pending() -> usize {
    100
}

fn default_typing_debounce_ms() -> u64 {
    1000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Build a configuration with default connection and message settings
    pub fn new(
        endpoint: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            session: SessionSection {
                endpoint: endpoint.into(),
                user_id: user_id.into(),
                session_id: session_id.into(),
                auto_connect: true,
            },
            connection: ConnectionSection::default(),
            messages: MessagesSection::default(),
        }
    }

    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.session.endpoint)?;
        validate_identifier("user_id", &self.session.user_id)?;
        validate_identifier("session_id", &self.session.session_id)?;

        if self.messages.history_limit == 0 {
            return Err(ConfigError::InvalidConfig(
                "messages.history_limit must be greater than 0".to_string(),
            ));
        }
        if self.messages.max_pending == 0 {
            return Err(ConfigError::InvalidConfig(
                "messages.max_pending must be greater than 0".to_string(),
            ));
        }
        if self.connection.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connection.heartbeat_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.connection.retry_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "connection.retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.session.auto_connect = auto_connect;
        self
    }

    /// Render as TOML, as shown by `rds-chat config --show`
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ConfigError::InvalidEndpoint(format!("'{endpoint}': {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ConfigError::InvalidEndpoint(format!(
            "'{endpoint}' must use the ws or wss scheme"
        )));
    }
    Ok(())
}

fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidIdentifier(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
