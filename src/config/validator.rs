//! Configuration validator for typescope
//!
//! Validates configuration values to ensure they are within acceptable ranges.

use super::loader::{
    Config, ConfigError, LocatorConfig, LoggingConfig, MemoryConfig, MetadataConfig, ScanConfig,
};
use tracing::warn;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire configuration
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_scan(&config.scan)?;
        Self::validate_memory(&config.memory)?;
        Self::validate_metadata(&config.metadata)?;
        Self::validate_locator(&config.locator)?;
        Self::validate_logging(&config.logging)?;
        Ok(())
    }

    /// Validates scan configuration
    fn validate_scan(scan: &ScanConfig) -> Result<(), ConfigError> {
        if scan.progress_interval == 0 {
            return Err(ConfigError::Invalid(
                "Progress interval must be at least 1".to_string(),
            ));
        }

        if scan.max_type_rows == 0 {
            return Err(ConfigError::Invalid(
                "Maximum type rows must be at least 1".to_string(),
            ));
        }

        if scan.max_field_rows == 0 {
            return Err(ConfigError::Invalid(
                "Maximum field rows must be at least 1".to_string(),
            ));
        }

        if scan.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "Scan workers must be at least 1".to_string(),
            ));
        }

        if scan.max_workers > 128 {
            return Err(ConfigError::Invalid(
                "Scan workers cannot exceed 128".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates memory configuration
    fn validate_memory(memory: &MemoryConfig) -> Result<(), ConfigError> {
        // A header row is the largest single read the decoder issues
        if memory.max_read_size < 64 {
            return Err(ConfigError::Invalid(
                "Maximum read size must be at least 64 bytes".to_string(),
            ));
        }

        if memory.max_read_size > 104857600 {
            warn!("Maximum read size exceeds 100MB");
        }

        if memory.read_timeout_ms > 0 && memory.read_workers == 0 {
            return Err(ConfigError::Invalid(
                "Read workers must be at least 1 when the read timeout is enabled".to_string(),
            ));
        }

        if memory.cache_enabled && memory.cache_entries == 0 {
            return Err(ConfigError::Invalid(
                "Cache entries must be at least 1 when the cache is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates metadata configuration
    fn validate_metadata(metadata: &MetadataConfig) -> Result<(), ConfigError> {
        if metadata.max_name_length == 0 {
            return Err(ConfigError::Invalid(
                "Maximum name length must be greater than 0".to_string(),
            ));
        }

        if metadata.root_rva_offset > u64::from(u32::MAX) {
            return Err(ConfigError::Invalid(
                "Root RVA offset must fit in 32 bits".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates locator configuration
    fn validate_locator(locator: &LocatorConfig) -> Result<(), ConfigError> {
        if locator.default_module.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Default module cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates logging configuration
    fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                logging.level, valid_levels
            )));
        }

        Ok(())
    }
}

/// Validates a configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    ConfigValidator::validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_progress_interval() {
        let mut config = Config::default();
        config.scan.progress_interval = 0;
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Progress interval"));
    }

    #[test]
    fn test_invalid_worker_count() {
        let mut config = Config::default();
        config.scan.max_workers = 0;
        assert!(validate_config(&config).is_err());

        config.scan.max_workers = 129;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_read_workers_needed_with_timeout() {
        let mut config = Config::default();
        config.memory.read_workers = 0;
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("Read workers"));

        config.memory.read_timeout_ms = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_field_row_limit() {
        let mut config = Config::default();
        config.scan.max_field_rows = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_cache() {
        let mut config = Config::default();
        config.memory.cache_entries = 0;
        assert!(validate_config(&config).is_err());

        config.memory.cache_enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_metadata() {
        let mut config = Config::default();
        config.metadata.max_name_length = 0;
        assert!(validate_config(&config).is_err());

        config.metadata.max_name_length = 256;
        config.metadata.root_rva_offset = u64::from(u32::MAX) + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("log level"));
    }

    #[test]
    fn test_edge_cases() {
        let mut config = Config::default();

        config.scan.progress_interval = 1;
        config.scan.max_type_rows = 1;
        config.scan.max_field_rows = 1;
        config.scan.max_workers = 1;
        config.memory.max_read_size = 64;
        config.memory.read_timeout_ms = 0;
        assert!(validate_config(&config).is_ok());

        config.scan.max_workers = 128;
        config.memory.max_read_size = 104857600; // 100MB
        assert!(validate_config(&config).is_ok());
    }
}
