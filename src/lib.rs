//! typescope: decode the type metadata tables of a running process into a
//! queryable catalog

pub mod catalog;
pub mod config;
pub mod core;
pub mod memory;
pub mod metadata;
pub mod process;
pub mod scan;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

// Re-export main types from core module
pub use core::types::{
    Address, DecodeError, FieldDefinition, LocateError, MemoryError, MemoryResult, ModuleInfo,
    PointerWidth, ProcessArchitecture, ProcessId, ProcessInfo, RowError, ScanError,
    TypeDefinition, TypeKind,
};

pub use catalog::{CatalogError, GlobPattern, TypeCatalog};
pub use config::Config;
pub use memory::{MemoryRegion, MemorySource};
pub use process::{MemorySourceKind, ProcessHandle};
pub use scan::{
    run_scan, run_scan_async, scan_many, CancellationToken, EventSink, ScanEvent, ScanOutcome,
    ScanReport, ScanRequest,
};
