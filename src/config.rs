//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub legacy: LegacyConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Legacy WebSocket transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyConfig {
    #[serde(default = "default_legacy_enabled")]
    pub enabled: bool,

    #[serde(default = "default_legacy_url")]
    pub url: String,
}

fn default_legacy_enabled() -> bool {
    true
}

fn default_legacy_url() -> String {
    "ws://localhost:5000/api/v1/websocket".to_string()
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            enabled: default_legacy_enabled(),
            url: default_legacy_url(),
        }
    }
}

/// MQTT broker transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_broker_username")]
    pub username: String,

    /// Opaque access token passed as the MQTT password
    pub password: Option<String>,

    #[serde(default = "default_broker_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    format!("dashlink-{}", uuid::Uuid::new_v4().simple())
}

fn default_broker_username() -> String {
    "token".to_string()
}

fn default_broker_keep_alive() -> u64 {
    60
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            username: default_broker_username(),
            password: None,
            keep_alive_secs: default_broker_keep_alive(),
        }
    }
}

/// Session timing and behavior
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    #[serde(default = "default_notice_grace")]
    pub notice_grace_ms: u64,

    #[serde(default = "default_relay_sequence_updates")]
    pub relay_sequence_updates: bool,
}

fn default_reconnect_delay() -> u64 {
    10
}

fn default_keepalive_interval() -> u64 {
    20
}

fn default_notice_grace() -> u64 {
    1000
}

fn default_relay_sequence_updates() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            keepalive_interval_secs: default_keepalive_interval(),
            notice_grace_ms: default_notice_grace(),
            relay_sequence_updates: default_relay_sequence_updates(),
        }
    }
}

impl SessionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn notice_grace(&self) -> Duration {
        Duration::from_millis(self.notice_grace_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let discovered = Self::discover();
        discovered.log();
        discovered.config
    }

    /// Candidate config files, in search order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("dashlink").join("config.toml")),
            Some(PathBuf::from("/etc/dashlink/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Search the default locations without logging, so the caller can log
    /// once tracing is set up
    pub fn discover() -> Discovered {
        Self::discover_in(&Self::default_paths())
    }

    /// First candidate that loads wins; environment overrides always apply
    pub fn discover_in(paths: &[PathBuf]) -> Discovered {
        let mut rejected = Vec::new();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    return Discovered {
                        config,
                        source: Some(path.clone()),
                        rejected,
                    }
                }
                Err(e) => rejected.push((path.clone(), e)),
            }
        }

        Discovered {
            config: Self::from_env(),
            source: None,
            rejected,
        }
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.reconnect_delay_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.reconnect_delay_secs must be greater than zero".to_string(),
            ));
        }
        if self.session.keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.keepalive_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.broker.enabled && self.broker.host.is_empty() {
            return Err(ConfigError::Invalid(
                "broker.host is required when the broker is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Legacy overrides
        if let Ok(url) = std::env::var("DASHLINK_LEGACY_URL") {
            self.legacy.url = url;
        }

        // Broker overrides
        if let Ok(host) = std::env::var("DASHLINK_BROKER_HOST") {
            self.broker.host = host;
            self.broker.enabled = true;
        }
        if let Ok(port) = std::env::var("DASHLINK_BROKER_PORT") {
            if let Ok(p) = port.parse() {
                self.broker.port = p;
            }
        }
        if let Ok(token) = std::env::var("DASHLINK_BROKER_TOKEN") {
            self.broker.password = Some(token);
        }

        // Logging overrides
        if let Ok(level) = std::env::var("DASHLINK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("DASHLINK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Outcome of searching for a config file
#[derive(Debug)]
pub struct Discovered {
    pub config: Config,
    /// File the config came from; `None` means defaults plus environment
    pub source: Option<PathBuf>,
    /// Files that exist but failed to load
    pub rejected: Vec<(PathBuf, ConfigError)>,
}

impl Discovered {
    pub fn log(&self) {
        for (path, e) in &self.rejected {
            tracing::warn!("Failed to load config from {:?}: {}", path, e);
        }
        match &self.source {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Dashlink Configuration
#
# Environment variables override these settings:
# - DASHLINK_LEGACY_URL
# - DASHLINK_BROKER_HOST (also enables the broker)
# - DASHLINK_BROKER_PORT
# - DASHLINK_BROKER_TOKEN
# - DASHLINK_LOG_LEVEL
# - DASHLINK_LOG_FORMAT

[legacy]
# Use the WebSocket message endpoint
enabled = true

# WebSocket URL of the message endpoint
url = "ws://localhost:5000/api/v1/websocket"

[broker]
# Use the MQTT broker
enabled = false

# Broker host and port
host = "localhost"
port = 1883

# MQTT client id (generated when omitted)
# client_id = "dashlink-dashboard"

# Credentials; the password is an access token
username = "token"
# password = ""

# MQTT keep-alive (seconds)
keep_alive_secs = 60

[session]
# Delay before reconnecting after a lost connection (seconds)
reconnect_delay_secs = 10

# Interval between keepalive pings on the WebSocket (seconds)
keepalive_interval_secs = 20

# Delay before dismissing the reconnect notice after reopening (ms)
notice_grace_ms = 1000

# Turn legacy sequence_update messages into sequence events
relay_sequence_updates = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.legacy.enabled);
        assert!(!config.broker.enabled);
        assert_eq!(config.broker.port, 1883);
        assert!(config.broker.client_id.starts_with("dashlink-"));
        assert_eq!(config.session.reconnect_delay(), Duration::from_secs(10));
        assert_eq!(config.session.keepalive_interval(), Duration::from_secs(20));
        assert_eq!(config.session.notice_grace(), Duration::from_millis(1000));
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.broker.username, "token");
        assert!(config.session.relay_sequence_updates);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[legacy]
enabled = false

[broker]
enabled = true
host = "broker.example"
port = 8883
password = "secret"

[session]
reconnect_delay_secs = 3
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(!config.legacy.enabled);
        assert!(config.broker.enabled);
        assert_eq!(config.broker.host, "broker.example");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.broker.password.as_deref(), Some("secret"));
        assert_eq!(config.session.reconnect_delay_secs, 3);
        assert_eq!(config.session.keepalive_interval_secs, 20);
    }

    #[test]
    fn test_discover_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("good.toml");
        std::fs::write(&broken, "[session\n").unwrap();
        std::fs::write(&good, "[session]\nreconnect_delay_secs = 4\n").unwrap();

        let found = Config::discover_in(&[
            dir.path().join("missing.toml"),
            broken.clone(),
            good.clone(),
        ]);
        assert_eq!(found.source, Some(good));
        assert_eq!(found.config.session.reconnect_delay_secs, 4);
        assert_eq!(found.rejected.len(), 1);
        assert_eq!(found.rejected[0].0, broken);
        assert!(matches!(found.rejected[0].1, ConfigError::Parse { .. }));

        let fallback = Config::discover_in(&[dir.path().join("missing.toml")]);
        assert!(fallback.source.is_none());
        assert!(fallback.rejected.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nreconnect_delay_secs = 0").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session\n").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse { .. })));

        assert!(matches!(
            Config::load(Path::new("/nonexistent/dashlink.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
