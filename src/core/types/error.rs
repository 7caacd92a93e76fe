//! Error types for typescope
//!
//! Errors are layered: `MemoryError` for a single read, `DecodeError` and
//! `RowError` for metadata decoding, `LocateError` for module lookup and
//! `ScanError` for the outcome of a whole scan.

use super::address::Address;
use std::fmt;
use thiserror::Error;

/// Error for a single memory read
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Invalid memory address {address} ({len} bytes)")]
    InvalidAddress { address: Address, len: usize },

    #[error("Invalid address: {0}")]
    InvalidAddressText(String),

    #[error("Access denied at {address}: {reason}")]
    AccessDenied { address: Address, reason: String },

    #[error("Partial read at {address}: requested {requested} bytes, got {read}")]
    PartialRead {
        address: Address,
        requested: usize,
        read: usize,
    },

    #[error("Read at {address} timed out after {timeout_ms} ms")]
    Timeout { address: Address, timeout_ms: u64 },

    #[error("Read of {requested} bytes exceeds the {limit} byte limit")]
    ReadTooLarge { requested: usize, limit: usize },

    #[error("Process unavailable: {0}")]
    ProcessUnavailable(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Snapshot format error: {0}")]
    SnapshotFormat(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

impl MemoryError {
    /// Creates an invalid address error for an unmapped range
    pub fn invalid_address(address: Address, len: usize) -> Self {
        MemoryError::InvalidAddress { address, len }
    }

    /// Creates an access denied error for a protected range
    pub fn access_denied(address: Address, reason: impl Into<String>) -> Self {
        MemoryError::AccessDenied {
            address,
            reason: reason.into(),
        }
    }

    /// Creates the error for address arithmetic that left the address space
    pub fn address_overflow(base: Address, offset: u64) -> Self {
        MemoryError::InvalidAddressText(format!("{} + 0x{:X} overflows", base, offset))
    }

    /// Creates a partial read error
    pub fn partial_read(address: Address, requested: usize, read: usize) -> Self {
        MemoryError::PartialRead {
            address,
            requested,
            read,
        }
    }

    /// True when the target process itself is gone, not just one range
    pub fn is_process_gone(&self) -> bool {
        matches!(self, MemoryError::ProcessUnavailable(_))
    }
}

/// Error decoding metadata structures
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("memory access failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("malformed metadata: {0}")]
    Malformed(String),

    #[error("field row {field_index}: {error}")]
    InField {
        field_index: u32,
        #[source]
        error: Box<DecodeError>,
    },
}

impl DecodeError {
    /// Creates a malformed metadata error
    pub fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::Malformed(reason.into())
    }

    /// Wraps an error raised while decoding a field row
    pub fn in_field(field_index: u32, error: DecodeError) -> Self {
        DecodeError::InField {
            field_index,
            error: Box::new(error),
        }
    }

    /// True when the root cause is a failed memory read
    pub fn is_memory_error(&self) -> bool {
        match self {
            DecodeError::Memory(_) => true,
            DecodeError::Malformed(_) => false,
            DecodeError::InField { error, .. } => error.is_memory_error(),
        }
    }

    /// The reason the target went away, when a read failed because of it
    pub fn process_gone(&self) -> Option<&str> {
        match self {
            DecodeError::Memory(MemoryError::ProcessUnavailable(reason)) => Some(reason),
            DecodeError::Memory(_) | DecodeError::Malformed(_) => None,
            DecodeError::InField { error, .. } => error.process_gone(),
        }
    }
}

/// A type row that could not be decoded; the scan skips it and continues
#[derive(Error, Debug)]
#[error("type row {index}: {error}")]
pub struct RowError {
    pub index: u32,
    #[source]
    pub error: DecodeError,
}

impl RowError {
    pub fn new(index: u32, error: impl Into<DecodeError>) -> Self {
        RowError {
            index,
            error: error.into(),
        }
    }
}

/// Error locating a module and its metadata root
#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Process unavailable: {0}")]
    ProcessUnavailable(String),

    #[error("Module not found: {module} in process {process}")]
    ModuleNotFound { module: String, process: String },

    #[error("Module {module} has no readable metadata root: {reason}")]
    NoMetadata { module: String, reason: String },

    #[error("Memory access failed: {0}")]
    Memory(#[from] MemoryError),
}

impl LocateError {
    pub fn module_not_found(module: impl Into<String>, process: impl fmt::Display) -> Self {
        LocateError::ModuleNotFound {
            module: module.into(),
            process: process.to_string(),
        }
    }

    pub fn no_metadata(module: impl Into<String>, reason: impl Into<String>) -> Self {
        LocateError::NoMetadata {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal outcome of a scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Process unavailable: {0}")]
    ProcessUnavailable(String),

    #[error("Module not found: {module} in process {process}")]
    ModuleNotFound { module: String, process: String },

    #[error("Module {module} has no readable metadata root: {reason}")]
    NoMetadata { module: String, reason: String },

    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("Memory access failed reading the metadata header: {0}")]
    MemoryAccess(MemoryError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Scan worker failed: {0}")]
    Worker(String),
}

impl From<LocateError> for ScanError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::ProcessUnavailable(msg) => ScanError::ProcessUnavailable(msg),
            LocateError::ModuleNotFound { module, process } => {
                ScanError::ModuleNotFound { module, process }
            }
            LocateError::NoMetadata { module, reason } => ScanError::NoMetadata { module, reason },
            LocateError::Memory(MemoryError::ProcessUnavailable(msg)) => {
                ScanError::ProcessUnavailable(msg)
            }
            LocateError::Memory(err) => ScanError::MemoryAccess(err),
        }
    }
}

impl From<DecodeError> for ScanError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Memory(MemoryError::ProcessUnavailable(msg)) => {
                ScanError::ProcessUnavailable(msg)
            }
            DecodeError::Memory(err) => ScanError::MemoryAccess(err),
            other => ScanError::MalformedMetadata(other.to_string()),
        }
    }
}

impl From<MemoryError> for ScanError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::ProcessUnavailable(msg) => ScanError::ProcessUnavailable(msg),
            other => ScanError::MemoryAccess(other),
        }
    }
}
