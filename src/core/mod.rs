//! Core module containing the fundamental types of typescope
//!
//! Addresses, process and module descriptions, decoded type definitions and
//! the error types used by the memory, metadata, catalog and scan layers.

pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    Address, DecodeError, FieldDefinition, LocateError, MemoryError, MemoryResult, ModuleInfo,
    ProcessInfo, RowError, ScanError, TypeDefinition, TypeKind,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
