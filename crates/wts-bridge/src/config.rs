//! Bridge configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::abi::CHANNEL_CHUNK_LENGTH;
use crate::types::{NotifyScope, SendMessageOptions, DEFAULT_MESSAGE_TIMEOUT_SECS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for the service facade and the helpers it drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Timeout for message boxes sent through the service (seconds).
    pub message_timeout_secs: u32,
    /// Whether logoff/disconnect wait for the operation to complete.
    pub wait_for_operations: bool,
    /// Wait per virtual channel read (milliseconds).
    pub channel_read_timeout_ms: u32,
    /// Internal read buffer of channels opened by the service. Sizes below
    /// `CHANNEL_CHUNK_LENGTH` are raised to it.
    pub channel_read_buffer: usize,
    /// Scope used when the service registers for session notifications.
    pub notify_scope: NotifyScope,
    /// Maximum number of open server handles.
    pub max_open_servers: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            message_timeout_secs: DEFAULT_MESSAGE_TIMEOUT_SECS,
            wait_for_operations: true,
            channel_read_timeout_ms: 5_000,
            channel_read_buffer: CHANNEL_CHUNK_LENGTH,
            notify_scope: NotifyScope::ThisSession,
            max_open_servers: 20,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_open_servers == 0 {
            return Err(ConfigError::Invalid("maxOpenServers must be at least 1".into()));
        }
        if self.channel_read_buffer == 0 {
            return Err(ConfigError::Invalid("channelReadBuffer must be at least 1".into()));
        }
        Ok(())
    }

    /// Message options for a plain OK box under this config.
    pub fn message_options(&self) -> SendMessageOptions {
        SendMessageOptions {
            timeout_secs: self.message_timeout_secs,
            ..SendMessageOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = BridgeConfig::default();
        assert_eq!(c.message_timeout_secs, 10);
        assert!(c.wait_for_operations);
        assert_eq!(c.channel_read_buffer, 1600);
        assert_eq!(c.max_open_servers, 20);
        assert_eq!(c.notify_scope, NotifyScope::ThisSession);
        assert_eq!(c.message_options().timeout_secs, 10);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = BridgeConfig::from_json(r#"{"maxOpenServers": 4, "notifyScope": "allSessions"}"#)
            .unwrap();
        assert_eq!(c.max_open_servers, 4);
        assert_eq!(c.notify_scope, NotifyScope::AllSessions);
        assert_eq!(c.channel_read_timeout_ms, 5_000);
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = BridgeConfig::from_json(r#"{"maxOpenServer": 4}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_servers_rejected() {
        let err = BridgeConfig::from_json(r#"{"maxOpenServers": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"messageTimeoutSecs": 3, "waitForOperations": false}}"#).unwrap();
        let c = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(c.message_timeout_secs, 3);
        assert!(!c.wait_for_operations);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(BridgeConfig::default()).unwrap();
        assert_eq!(json["maxOpenServers"], 20);
        assert_eq!(json["channelReadBuffer"], 1600);
    }
}
