//! # Configuration Management
//!
//! Centralized configuration for the protocol server.
//!
//! This module provides structured configuration for the listener, login and
//! identity checks, the frame pipeline, the server list entry and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables (`MACHINE_PROTOCOL_*`) via `from_env()`
//! - Direct instantiation with defaults, optionally mutated by `default_with_overrides()`
//!
//! ## Security Considerations
//! - The frame cap defaults to the largest length a 3-byte prefix can express
//! - Keepalive and read timeouts bound how long a silent peer holds a slot
//! - Offline mode (`auth.online_mode = false`) trusts client-chosen usernames

use crate::error::{ProtocolError, Result};
use crate::protocol::{PROTOCOL_VERSION, VERSION_NAME};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Largest frame a 3-byte varint length prefix can describe.
pub const MAX_FRAME_SIZE: usize = 2_097_151;

/// Default compression threshold in bytes; negative disables compression.
pub const DEFAULT_COMPRESSION_THRESHOLD: i32 = 256;

pub const DEFAULT_SESSION_SERVER: &str = "https://sessionserver.mojang.com";

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Login encryption and identity service settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Frame pipeline settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Server list entry
    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables leave the default in place.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("MACHINE_PROTOCOL_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Some(val) = env_parse::<usize>("MACHINE_PROTOCOL_MAX_CONNECTIONS") {
            config.server.max_connections = val;
        }

        if let Some(val) = env_parse::<u64>("MACHINE_PROTOCOL_READ_TIMEOUT_MS") {
            config.server.read_timeout = Duration::from_millis(val);
        }

        if let Some(val) = env_parse::<u64>("MACHINE_PROTOCOL_KEEPALIVE_INTERVAL_MS") {
            config.server.keepalive_interval = Duration::from_millis(val);
        }

        if let Some(val) = env_parse::<bool>("MACHINE_PROTOCOL_ONLINE_MODE") {
            config.auth.online_mode = val;
        }

        if let Ok(url) = std::env::var("MACHINE_PROTOCOL_SESSION_SERVER") {
            config.auth.session_server = url;
        }

        if let Some(val) = env_parse::<i32>("MACHINE_PROTOCOL_COMPRESSION_THRESHOLD") {
            config.transport.compression_threshold = val;
        }

        if let Ok(motd) = std::env::var("MACHINE_PROTOCOL_MOTD") {
            config.status.motd = motd;
        }

        if let Ok(level) = std::env::var("MACHINE_PROTOCOL_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid log level in environment: {level}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.auth.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.status.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

/// Listener, tick and liveness settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:25565")
    pub address: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Decoded packets a connection may have queued for the tick context
    pub backpressure_limit: usize,

    /// Period of the tick context's housekeeping (keepalives)
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// How often a keepalive ping is sent in configuration and play
    #[serde(with = "duration_serde")]
    pub keepalive_interval: Duration,

    /// How long a ping may go unanswered
    #[serde(with = "duration_serde")]
    pub keepalive_timeout: Duration,

    /// Silence after which a connection is torn down locally
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Whether handshakes with the transfer intent are admitted
    pub accepts_transfers: bool,

    /// Send "finish configuration" as soon as a client enters configuration.
    /// Leave off when collaborators drive the configuration phase.
    pub auto_finish_configuration: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("0.0.0.0:25565"),
            max_connections: 1000,
            backpressure_limit: 256,
            tick_interval: timeout::TICK_INTERVAL,
            keepalive_interval: timeout::KEEPALIVE_INTERVAL,
            keepalive_timeout: timeout::KEEPALIVE_TIMEOUT,
            read_timeout: timeout::READ_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            accepts_transfers: false,
            auto_finish_configuration: false,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:25565')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.backpressure_limit == 0 {
            errors.push("Backpressure limit must be greater than 0".to_string());
        }

        if self.tick_interval.as_millis() < 1 {
            errors.push("Tick interval too short (minimum: 1ms)".to_string());
        } else if self.tick_interval > self.keepalive_interval {
            errors.push("Tick interval cannot exceed the keepalive interval".to_string());
        }

        if self.keepalive_interval.as_millis() < 100 {
            errors.push("Keepalive interval too short (minimum: 100ms)".to_string());
        }

        if self.keepalive_timeout < self.keepalive_interval {
            errors.push("Keepalive timeout must be at least the keepalive interval".to_string());
        }

        if self.read_timeout.as_millis() < 100 {
            errors.push("Read timeout too short (minimum: 100ms)".to_string());
        } else if self.read_timeout.as_secs() > 300 {
            errors.push("Read timeout too long (maximum: 300s)".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Login encryption and identity service settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Verify every login against the identity service
    pub online_mode: bool,

    /// Encrypt offline-mode connections too
    pub enforce_encryption: bool,

    /// Base URL of the identity service
    pub session_server: String,

    /// Bound on one identity service round trip
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// RSA modulus size of the server key pair
    pub key_bits: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            online_mode: true,
            enforce_encryption: false,
            session_server: DEFAULT_SESSION_SERVER.to_string(),
            request_timeout: timeout::DEFAULT_TIMEOUT,
            key_bits: crate::protocol::auth::DEFAULT_KEY_BITS,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.online_mode
            && !(self.session_server.starts_with("https://")
                || self.session_server.starts_with("http://"))
        {
            errors.push(format!(
                "Session server must be an http(s) URL: '{}'",
                self.session_server
            ));
        }

        if self.request_timeout.as_millis() < 100 {
            errors.push("Identity request timeout too short (minimum: 100ms)".to_string());
        } else if self.request_timeout.as_secs() > 60 {
            errors.push("Identity request timeout too long (maximum: 60s)".to_string());
        }

        if !(512..=4096).contains(&self.key_bits) {
            errors.push(format!(
                "Invalid key size: {} bits (valid range: 512-4096)",
                self.key_bits
            ));
        }

        errors
    }

    /// Whether logins go through the encryption exchange.
    pub fn encrypts(&self) -> bool {
        self.online_mode || self.enforce_encryption
    }
}

/// Frame pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum accepted frame length in bytes
    pub max_frame_size: usize,

    /// Bodies at or above this size are compressed; negative disables compression
    pub compression_threshold: i32,

    /// zlib level (0-9)
    pub compression_level: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            compression_level: crate::utils::compression::DEFAULT_LEVEL,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > MAX_FRAME_SIZE {
            errors.push(format!(
                "Max frame size too large: {} bytes (a 3-byte prefix allows {MAX_FRAME_SIZE})",
                self.max_frame_size
            ));
        }

        if self.compression_level > 9 {
            errors.push(format!(
                "Invalid compression level: {} (valid range: 0-9)",
                self.compression_level
            ));
        }

        if let Ok(threshold) = usize::try_from(self.compression_threshold) {
            if threshold > self.max_frame_size {
                errors.push(
                    "Compression threshold cannot be larger than max frame size".to_string(),
                );
            }
        }

        errors
    }

    /// The threshold, if compression is on.
    pub fn compression(&self) -> Option<usize> {
        usize::try_from(self.compression_threshold).ok()
    }
}

/// What the server list shows
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    pub motd: String,
    pub max_players: usize,
    pub version_name: String,
    pub protocol_version: i32,
    pub enforces_secure_chat: bool,
    /// Answer pre-netty `0xFE` pings
    pub legacy_ping: bool,
    /// `data:image/png;base64,...`
    pub favicon: Option<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            motd: String::from("A Minecraft Server"),
            max_players: 20,
            version_name: VERSION_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION,
            enforces_secure_chat: false,
            legacy_ping: true,
            favicon: None,
        }
    }
}

impl StatusConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.version_name.is_empty() {
            errors.push("Version name cannot be empty".to_string());
        }

        if let Some(favicon) = &self.favicon {
            if !favicon.starts_with("data:image/png;base64,") {
                errors.push("Favicon must be a base64 PNG data URI".to_string());
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("machine-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
