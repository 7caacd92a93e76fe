//! Default configuration values for typescope

use serde::{Deserialize, Serialize};

/// Default configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub scan: ScanDefaults,
    pub memory: MemoryDefaults,
    pub metadata: MetadataDefaults,
    pub locator: LocatorDefaults,
    pub logging: LoggingDefaults,
}

/// Default scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDefaults {
    pub progress_interval: u32,
    pub max_type_rows: u32,
    pub max_field_rows: u32,
    pub max_workers: usize,
}

/// Default memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDefaults {
    pub read_timeout_ms: u64,
    pub read_workers: usize,
    pub max_read_size: usize,
    pub cache_enabled: bool,
    pub cache_entries: usize,
    pub cache_max_age_ms: u64,
}

/// Default metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDefaults {
    pub root_rva_offset: u64,
    pub max_name_length: usize,
}

/// Default locator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorDefaults {
    pub case_sensitive: bool,
    pub default_module: String,
}

/// Default logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingDefaults {
    pub level: String,
}

/// Returns the default configuration
pub fn default_config() -> ConfigDefaults {
    ConfigDefaults {
        scan: ScanDefaults {
            progress_interval: 100,
            max_type_rows: 1_000_000,
            max_field_rows: 8_000_000,
            max_workers: num_cpus::get().min(8),
        },
        memory: MemoryDefaults {
            read_timeout_ms: 2000,
            read_workers: 4,
            max_read_size: 10485760, // 10MB
            cache_enabled: true,
            cache_entries: 4096,
            cache_max_age_ms: 5000,
        },
        metadata: MetadataDefaults {
            root_rva_offset: 0x40,
            max_name_length: 1024,
        },
        locator: LocatorDefaults {
            case_sensitive: true,
            default_module: "Assembly-CSharp".to_string(),
        },
        logging: LoggingDefaults {
            level: "info".to_string(),
        },
    }
}
