//! # Configuration Management
//!
//! Configuration for a P2P node instance.
//!
//! Every value the protocol engine needs (network identifier, protocol
//! versions, ports, limits and intervals) lives here and is passed to the
//! node at construction time. Nothing is read from process-wide state.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Security Considerations
//! - `max_payload_size` bounds the memory a single peer can make us allocate
//! - `max_connections` bounds the worker pool and the peer registry

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Current P2P protocol version announced in handshakes
pub const P2P_PROTOCOL_VERSION: u32 = 1;

/// Oldest P2P protocol version we accept from peers
pub const MIN_PROTOCOL_VERSION: u32 = 1;

/// Default P2P listening port
pub const DEFAULT_P2P_PORT: u16 = 18080;

/// Max allowed packet body size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Network identifier of the main network
pub const MAINNET_NETWORK_ID: [u8; 16] = [
    0x12, 0x30, 0xF1, 0x71, 0x61, 0x04, 0x41, 0x61, 0x17, 0x31, 0x00, 0x82, 0x16, 0xA1, 0xA1, 0x10,
];

/// Main node configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NodeConfig {
    /// Network identity and protocol versions
    #[serde(default)]
    pub network: NetworkSettings,

    /// Listener, limits and timers of the P2P server
    #[serde(default)]
    pub p2p: P2pConfig,

    /// Stub chain state announced to peers
    #[serde(default)]
    pub chain: ChainConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
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
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LEVIN_P2P_LISTEN_ADDRESS") {
            config.p2p.listen_address = addr;
        }

        if let Some(port) = env_parse("LEVIN_P2P_PORT")? {
            config.p2p.port = port;
        }

        if let Some(max) = env_parse("LEVIN_P2P_MAX_CONNECTIONS")? {
            config.p2p.max_connections = max;
        }

        if let Some(ms) = env_parse("LEVIN_P2P_POLLING_INTERVAL_MS")? {
            config.p2p.polling_interval = Duration::from_millis(ms);
        }

        if let Some(secs) = env_parse("LEVIN_P2P_TIMED_SYNC_INTERVAL_SECS")? {
            config.p2p.timed_sync_interval = Duration::from_secs(secs);
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
        errors.extend(self.network.validate());
        errors.extend(self.p2p.validate());
        errors.extend(self.chain.validate());
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

/// Network identity and protocol version settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkSettings {
    /// 16-byte network identifier, hex encoded in config files
    #[serde(with = "hex_serde")]
    pub network_id: [u8; 16],

    /// Protocol version announced to peers
    pub protocol_version: u32,

    /// Lowest protocol version accepted from peers
    pub min_protocol_version: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            network_id: MAINNET_NETWORK_ID,
            protocol_version: P2P_PROTOCOL_VERSION,
            min_protocol_version: MIN_PROTOCOL_VERSION,
        }
    }
}

impl NetworkSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.min_protocol_version > self.protocol_version {
            errors.push(format!(
                "Minimum protocol version {} is newer than announced version {}",
                self.min_protocol_version, self.protocol_version
            ));
        }

        if self.network_id == [0u8; 16] {
            errors.push("Network id must not be all zeroes".to_string());
        }

        errors
    }
}

/// P2P server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct P2pConfig {
    /// IP address to bind the listener to
    pub listen_address: String,

    /// Listening port, also announced to peers
    pub port: u16,

    /// Maximum number of concurrent peers; also the worker pool size
    pub max_connections: usize,

    /// Interval of the disconnect poller
    #[serde(with = "duration_serde")]
    pub polling_interval: Duration,

    /// Interval between timed sync rounds
    #[serde(with = "duration_secs_serde")]
    pub timed_sync_interval: Duration,

    /// Timeout for dialing a peer
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum allowed packet body size in bytes
    pub max_payload_size: usize,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_address: String::from("0.0.0.0"),
            port: DEFAULT_P2P_PORT,
            max_connections: 12,
            polling_interval: Duration::from_millis(1000),
            timed_sync_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl P2pConfig {
    /// Validate P2P configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.listen_address.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid listen address: '{}' (expected an IP address such as '0.0.0.0')",
                self.listen_address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 10_000 {
            errors.push(format!(
                "Max connections very high: {} (one worker task is spawned per slot)",
                self.max_connections
            ));
        }

        if self.polling_interval.as_millis() < 10 {
            errors.push("Polling interval too short (minimum: 10ms)".to_string());
        } else if self.polling_interval.as_secs() > 60 {
            errors.push("Polling interval too long (maximum: 60s)".to_string());
        }

        if self.timed_sync_interval.is_zero() {
            errors.push("Timed sync interval must be greater than 0".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_payload_size
            ));
        }

        errors
    }
}

/// Stand-in for the blockchain collaborator: the height and top block hash
/// announced in handshakes and timed syncs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub height: u64,

    #[serde(with = "hex_serde")]
    pub top_hash: [u8; 32],
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            height: 1,
            top_hash: [0u8; 32],
        }
    }
}

impl ChainConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.height == 0 {
            errors.push("Chain height must be at least 1 (genesis)".to_string());
        }
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
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
            app_name: String::from("levin-p2p"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
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

/// Parse an optional environment variable; a present but malformed value is an error
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {key}: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Helper module for Duration serialization/deserialization as milliseconds
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

/// Helper module for Duration serialization/deserialization as whole seconds
mod duration_secs_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Helper module for fixed-size byte arrays as hex strings
mod hex_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let mut out = [0u8; N];
        hex::decode_to_slice(&text, &mut out).map_err(|e| {
            serde::de::Error::custom(format!(
                "expected {} hex characters, got '{text}': {e}",
                N * 2
            ))
        })?;
        Ok(out)
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
