//! Core type definitions for typescope
//!
//! Address wrapper, process and module descriptions, decoded type and field
//! definitions, and the error taxonomy shared by every layer.

mod address;
mod error;
mod process_info;
mod type_def;

// Re-export all public types
pub use address::Address;
pub use error::{DecodeError, LocateError, MemoryError, MemoryResult, RowError, ScanError};
pub use process_info::{ModuleInfo, PointerWidth, ProcessArchitecture, ProcessInfo};
pub use type_def::{FieldDefinition, TypeDefinition, TypeKind};

// Common type aliases
pub type ProcessId = u32;
