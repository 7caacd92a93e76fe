//! Configuration module for typescope
//!
//! Provides configuration loading, validation, and default settings
//! for scans, memory access, metadata decoding and module lookup.

mod defaults;
mod loader;
mod validator;

pub use defaults::{default_config, ConfigDefaults};
pub use loader::{load_config, ConfigLoader};
pub use validator::{validate_config, ConfigValidator};

// Re-export the configuration structures
pub use loader::{Config, LocatorConfig, LoggingConfig, MemoryConfig, MetadataConfig, ScanConfig};

// Configuration-related error type
pub use loader::ConfigError;

// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;
