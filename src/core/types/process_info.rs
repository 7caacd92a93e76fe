//! Process and module information types

use super::{Address, ProcessId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Information about an attached target process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub name: String,
    pub path: Option<PathBuf>,
    pub architecture: ProcessArchitecture,
}

impl ProcessInfo {
    /// Creates a new ProcessInfo with minimal information
    pub fn new(pid: ProcessId, name: String) -> Self {
        ProcessInfo {
            pid,
            name,
            path: None,
            architecture: ProcessArchitecture::Unknown,
        }
    }

    /// Sets the detected architecture
    pub fn with_architecture(mut self, architecture: ProcessArchitecture) -> Self {
        self.architecture = architecture;
        self
    }
}

/// Process architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessArchitecture {
    X86,
    X64,
    ARM,
    ARM64,
    Unknown,
}

impl ProcessArchitecture {
    /// Pointer width of the target, if the architecture is known.
    ///
    /// Unknown targets never fall back to the host's width.
    pub fn pointer_width(&self) -> Option<PointerWidth> {
        match self {
            ProcessArchitecture::X86 | ProcessArchitecture::ARM => Some(PointerWidth::Bits32),
            ProcessArchitecture::X64 | ProcessArchitecture::ARM64 => Some(PointerWidth::Bits64),
            ProcessArchitecture::Unknown => None,
        }
    }

    /// Checks if this is a 64-bit architecture
    pub fn is_64bit(&self) -> bool {
        matches!(self, ProcessArchitecture::X64 | ProcessArchitecture::ARM64)
    }
}

/// Native pointer width of a target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    /// Size of a pointer in bytes
    pub const fn bytes(&self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

/// Information about a loaded module in a process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub path: Option<PathBuf>,
    pub base_address: Address,
    pub size: u64,
    /// Filled in by the module locator once the metadata root is verified
    pub metadata_root: Option<Address>,
}

impl ModuleInfo {
    /// Creates a new ModuleInfo
    pub fn new(name: String, base_address: Address, size: u64) -> Self {
        ModuleInfo {
            name,
            path: None,
            base_address,
            size,
            metadata_root: None,
        }
    }

    /// Gets the end address of the module, saturating at the top of the address space
    pub fn end_address(&self) -> Address {
        Address::new(self.base_address.as_u64().saturating_add(self.size))
    }

    /// Checks if an address is within this module
    pub fn contains_address(&self, address: Address) -> bool {
        address >= self.base_address && address < self.end_address()
    }

    /// File name without its final extension (`Assembly-CSharp.dll` -> `Assembly-CSharp`)
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => &self.name,
            Some(dot) => &self.name[..dot],
        }
    }

    /// Module name policy: exact match on the file name or on its stem.
    ///
    /// With `case_sensitive == false` both comparisons ignore ASCII case.
    pub fn matches_name(&self, query: &str, case_sensitive: bool) -> bool {
        let eq = |a: &str, b: &str| {
            if case_sensitive {
                a == b
            } else {
                a.eq_ignore_ascii_case(b)
            }
        };
        eq(&self.name, query) || eq(self.stem(), query)
    }
}
