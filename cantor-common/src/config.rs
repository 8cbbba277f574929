//! Bootstrap configuration loading and path resolution
//!
//! Settings sources priority:
//! 1. Command-line arguments
//! 2. Environment variables (`CANTOR_*`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! Tiers 1 and 2 are handled by clap in the binary; this module covers the
//! TOML file and the defaults, and merges overrides on top of them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config/data dirs
pub const APP_DIR_NAME: &str = "cantor";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5000;

/// Default bind address (loopback only)
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory containing one sub-directory per installed singer
    #[serde(default)]
    pub singers_path: Option<PathBuf>,

    /// EventBus buffer size
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Mixdown sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            singers_path: None,
            event_capacity: default_event_capacity(),
            sample_rate: default_sample_rate(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_event_capacity() -> usize {
    100
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line or through the environment
///
/// `None` means "not given", so the lower tiers apply.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub singers_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub singers_path: PathBuf,
    pub event_capacity: usize,
    pub sample_rate: u32,
    pub logging: LoggingConfig,
    /// TOML file that was read, if any
    pub config_file: Option<PathBuf>,
}

impl ServerConfig {
    /// `bind_address:port`
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Parse TOML configuration text
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load a TOML configuration file
///
/// A missing file yields defaults with a warning; an unreadable or malformed
/// file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found: {} (using built-in defaults)",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config = parse_toml_config(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML configuration file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolve the effective configuration
///
/// `config_file` is the explicit `--config` / `CANTOR_CONFIG` path; when it is
/// `None` the platform default location is tried.
pub fn resolve_config(
    config_file: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<ServerConfig> {
    let (toml_config, used_file) = match config_file {
        Some(path) => {
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "Config file {} does not exist",
                    path.display()
                )));
            }
            (load_toml_config(path)?, Some(path.to_path_buf()))
        }
        None => match default_config_file() {
            Some(path) if path.exists() => {
                let config = load_toml_config(&path)?;
                (config, Some(path))
            }
            _ => (TomlConfig::default(), None),
        },
    };

    Ok(merge(toml_config, overrides, used_file))
}

fn merge(
    toml_config: TomlConfig,
    overrides: ConfigOverrides,
    config_file: Option<PathBuf>,
) -> ServerConfig {
    let mut logging = toml_config.logging;
    if let Some(level) = overrides.log_level {
        logging.level = level;
    }

    ServerConfig {
        bind_address: overrides.bind_address.unwrap_or(toml_config.bind_address),
        port: overrides.port.unwrap_or(toml_config.port),
        singers_path: overrides
            .singers_path
            .or(toml_config.singers_path)
            .unwrap_or_else(default_singers_path),
        event_capacity: toml_config.event_capacity.max(1),
        sample_rate: toml_config.sample_rate,
        logging,
        config_file,
    }
}

/// Platform default config file: `<config dir>/cantor/cantor-server.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("cantor-server.toml"))
}

/// Platform data directory: `<local data dir>/cantor`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./cantor_data"))
}

/// Default singer installation directory: `<data dir>/Singers`
pub fn default_singers_path() -> PathBuf {
    default_data_dir().join("Singers")
}
