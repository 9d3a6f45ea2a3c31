//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! `AGENTWIRE_*` environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stream::ManagerConfig;
use crate::websocket::WsClientConfig;

pub const ENV_TRANSPORT: &str = "AGENTWIRE_TRANSPORT";
pub const ENV_WS_URL: &str = "AGENTWIRE_WS_URL";
pub const ENV_HTTP_URL: &str = "AGENTWIRE_HTTP_URL";
pub const ENV_RESPONSE_TIMEOUT: &str = "AGENTWIRE_RESPONSE_TIMEOUT";
pub const ENV_CONNECT_TIMEOUT: &str = "AGENTWIRE_CONNECT_TIMEOUT";
pub const ENV_KEEPALIVE: &str = "AGENTWIRE_KEEPALIVE";
pub const ENV_MAX_RETRIES: &str = "AGENTWIRE_MAX_RETRIES";
pub const ENV_LOG: &str = "AGENTWIRE_LOG";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Missing value for {0}")]
    MissingValue(String),
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),
}

/// Which transport carries the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Ws,
    Http,
}

impl std::str::FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ws" | "websocket" => Ok(TransportKind::Ws),
            "http" | "sse" => Ok(TransportKind::Http),
            other => Err(ConfigError::InvalidValue(
                "transport".to_string(),
                format!("'{}' is not one of ws, http", other),
            )),
        }
    }
}

/// Values supplied on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub transport: Option<TransportKind>,
    pub ws_url: Option<String>,
    pub http_url: Option<String>,
    pub response_timeout_secs: Option<u64>,
}

/// Holds all configuration for one client run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportKind,
    pub ws_url: String,
    pub http_url: String,
    /// Approval response timeout
    pub response_timeout_secs: u64,
    /// HTTP connection establishment timeout
    pub connect_timeout_secs: u64,
    /// Ping interval; 0 disables keepalive
    pub keepalive_secs: u64,
    pub max_retries: u8,
    pub max_backoff_secs: u64,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Ws,
            ws_url: "ws://127.0.0.1:8000/live".to_string(),
            http_url: "http://127.0.0.1:8000/api/chat".to_string(),
            response_timeout_secs: 60,
            connect_timeout_secs: 10,
            keepalive_secs: 30,
            max_retries: 5,
            max_backoff_secs: 30,
            log_filter: "agentwire=info".to_string(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/agentwire/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("agentwire").join("config.json"))
    }

    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `AGENTWIRE_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(ENV_TRANSPORT) {
            self.transport = value.parse()?;
        }
        if let Ok(value) = std::env::var(ENV_WS_URL) {
            self.ws_url = value;
        }
        if let Ok(value) = std::env::var(ENV_HTTP_URL) {
            self.http_url = value;
        }
        if let Ok(value) = std::env::var(ENV_RESPONSE_TIMEOUT) {
            self.response_timeout_secs = parse_number(ENV_RESPONSE_TIMEOUT, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_CONNECT_TIMEOUT) {
            self.connect_timeout_secs = parse_number(ENV_CONNECT_TIMEOUT, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_KEEPALIVE) {
            self.keepalive_secs = parse_number(ENV_KEEPALIVE, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_MAX_RETRIES) {
            self.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_LOG) {
            self.log_filter = value;
        }
        Ok(())
    }

    /// Apply command-line overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(transport) = overrides.transport {
            self.transport = transport;
        }
        if let Some(url) = &overrides.ws_url {
            self.ws_url = url.clone();
        }
        if let Some(url) = &overrides.http_url {
            self.http_url = url.clone();
        }
        if let Some(secs) = overrides.response_timeout_secs {
            self.response_timeout_secs = secs;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "response_timeout_secs".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "connect_timeout_secs".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(
                "ws_url".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", self.ws_url),
            ));
        }
        if !(self.http_url.starts_with("http://") || self.http_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "http_url".to_string(),
                format!("'{}' is not an http:// or https:// URL", self.http_url),
            ));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }

    pub fn ws_client_config(&self) -> WsClientConfig {
        WsClientConfig {
            url: self.ws_url.clone(),
            max_retries: self.max_retries,
            max_backoff_secs: self.max_backoff_secs,
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            response_timeout: self.response_timeout(),
            keepalive_interval: self.keepalive_interval(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), format!("'{}' is not a valid number", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.response_timeout(), Duration::from_secs(60));
        assert_eq!(config.keepalive_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_keepalive_disables_ping() {
        let config = AppConfig {
            keepalive_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.keepalive_interval(), None);
        assert_eq!(config.manager_config().keepalive_interval, None);
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("ws".parse::<TransportKind>().unwrap(), TransportKind::Ws);
        assert_eq!("HTTP".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert!("smoke-signals".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(&ConfigOverrides {
                transport: Some(TransportKind::Http),
                http_url: Some("https://agent.example.com/chat".to_string()),
                response_timeout_secs: Some(5),
                ..ConfigOverrides::default()
            })
            .unwrap();
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.http_url, "https://agent.example.com/chat");
        assert_eq!(config.response_timeout_secs, 5);
    }

    #[test]
    fn test_invalid_urls_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(&ConfigOverrides {
            ws_url: Some("http://wrong-scheme".to_string()),
            ..ConfigOverrides::default()
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue(key, _)) if key == "ws_url"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = AppConfig {
            response_timeout_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_timeout_is_separate_from_response_timeout() {
        let config = AppConfig {
            response_timeout_secs: 300,
            ..AppConfig::default()
        };
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.response_timeout(), Duration::from_secs(300));

        let zero = AppConfig {
            connect_timeout_secs: 0,
            ..AppConfig::default()
        };
        match zero.validate() {
            Err(ConfigError::InvalidValue(key, _)) => assert_eq!(key, "connect_timeout_secs"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("KEY".to_string(), "bad".to_string());
        assert_eq!(err.to_string(), "Invalid value for KEY: bad");
        assert_eq!(
            ConfigError::MissingValue("--ws".to_string()).to_string(),
            "Missing value for --ws"
        );
    }

    #[test]
    fn test_ws_client_config_mapping() {
        let config = AppConfig {
            max_retries: 2,
            max_backoff_secs: 8,
            ..AppConfig::default()
        };
        let ws = config.ws_client_config();
        assert_eq!(ws.url, config.ws_url);
        assert_eq!(ws.max_retries, 2);
        assert_eq!(ws.max_backoff_secs, 8);
    }
}
