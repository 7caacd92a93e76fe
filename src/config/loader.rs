//! Configuration loader for typescope
//!
//! Handles loading configuration from TOML files and merging with defaults.

use super::defaults::default_config;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_scan")]
    pub scan: ScanConfig,

    #[serde(default = "default_memory")]
    pub memory: MemoryConfig,

    #[serde(default = "default_metadata")]
    pub metadata: MetadataConfig,

    #[serde(default = "default_locator")]
    pub locator: LocatorConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Emit a progress event every this many rows
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u32,
    /// Headers declaring more type rows than this are rejected
    #[serde(default = "default_max_type_rows")]
    pub max_type_rows: u32,
    /// Headers declaring more field rows than this are rejected
    #[serde(default = "default_max_field_rows")]
    pub max_field_rows: u32,
    /// Worker threads for concurrent independent scans
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

/// Memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// 0 disables the timeout decorator
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Threads serving reads when the timeout is enabled
    #[serde(default = "default_read_workers")]
    pub read_workers: usize,
    #[serde(default = "default_max_read_size")]
    pub max_read_size: usize,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,
    #[serde(default = "default_cache_max_age_ms")]
    pub cache_max_age_ms: u64,
}

/// Metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Offset inside the module image of the u32 RVA of the metadata root
    #[serde(default = "default_root_rva_offset")]
    pub root_rva_offset: u64,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

/// Module locator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
    #[serde(default = "default_module")]
    pub default_module: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Configuration loader
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ConfigLoader {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Loads configuration from file
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(
                self.config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        debug!("Loaded configuration from {}", self.config_path.display());
        Ok(config)
    }

    /// Loads configuration or returns defaults if the file is missing or unreadable
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(ConfigError::FileNotFound(_)) => Config::default(),
            Err(e) => {
                warn!(
                    "Ignoring configuration {}: {}",
                    self.config_path.display(),
                    e
                );
                Config::default()
            }
        }
    }

    /// Saves configuration to file
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Loads configuration from the default location
pub fn load_config() -> Result<Config, ConfigError> {
    let loader = ConfigLoader::new("typescope.toml");
    Ok(loader.load_or_default())
}

// Default functions for serde
fn default_scan() -> ScanConfig {
    let defaults = default_config();
    ScanConfig {
        progress_interval: defaults.scan.progress_interval,
        max_type_rows: defaults.scan.max_type_rows,
        max_field_rows: defaults.scan.max_field_rows,
        max_workers: defaults.scan.max_workers,
    }
}

fn default_memory() -> MemoryConfig {
    let defaults = default_config();
    MemoryConfig {
        read_timeout_ms: defaults.memory.read_timeout_ms,
        read_workers: defaults.memory.read_workers,
        max_read_size: defaults.memory.max_read_size,
        cache_enabled: defaults.memory.cache_enabled,
        cache_entries: defaults.memory.cache_entries,
        cache_max_age_ms: defaults.memory.cache_max_age_ms,
    }
}

fn default_metadata() -> MetadataConfig {
    let defaults = default_config();
    MetadataConfig {
        root_rva_offset: defaults.metadata.root_rva_offset,
        max_name_length: defaults.metadata.max_name_length,
    }
}

fn default_locator() -> LocatorConfig {
    let defaults = default_config();
    LocatorConfig {
        case_sensitive: defaults.locator.case_sensitive,
        default_module: defaults.locator.default_module,
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_config().logging.level,
    }
}

// Individual field defaults
fn default_progress_interval() -> u32 {
    default_config().scan.progress_interval
}

fn default_max_type_rows() -> u32 {
    default_config().scan.max_type_rows
}

fn default_max_field_rows() -> u32 {
    default_config().scan.max_field_rows
}

fn default_max_workers() -> usize {
    default_config().scan.max_workers
}

fn default_read_timeout_ms() -> u64 {
    default_config().memory.read_timeout_ms
}

fn default_read_workers() -> usize {
    default_config().memory.read_workers
}

fn default_max_read_size() -> usize {
    default_config().memory.max_read_size
}

fn default_cache_enabled() -> bool {
    default_config().memory.cache_enabled
}

fn default_cache_entries() -> usize {
    default_config().memory.cache_entries
}

fn default_cache_max_age_ms() -> u64 {
    default_config().memory.cache_max_age_ms
}

fn default_root_rva_offset() -> u64 {
    default_config().metadata.root_rva_offset
}

fn default_max_name_length() -> usize {
    default_config().metadata.max_name_length
}

fn default_case_sensitive() -> bool {
    default_config().locator.case_sensitive
}

fn default_module() -> String {
    default_config().locator.default_module
}

fn default_log_level() -> String {
    default_config().logging.level
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan: default_scan(),
            memory: default_memory(),
            metadata: default_metadata(),
            locator: default_locator(),
            logging: default_logging(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        default_scan()
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        default_memory()
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        default_metadata()
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        default_locator()
    }
}
