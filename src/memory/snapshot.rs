//! Memory snapshots stored as TOML files
//!
//! A snapshot describes a captured process: its identity, its module list and
//! the bytes of selected memory ranges (hex encoded). `SnapshotSource` serves
//! reads from it offline, so a scan against a snapshot behaves exactly like a
//! scan against the live process the bytes were taken from.
//!
//! ```toml
//! [process]
//! pid = 4242
//! name = "game.exe"
//! architecture = "x64"
//!
//! [[modules]]
//! name = "GameAssembly.dll"
//! base = "0x180000000"
//! size = 65536
//!
//! [[regions]]
//! base = "0x180000000"
//! data = "54594d44..."
//! ```

use super::buffer::BufferSource;
use super::source::{MemoryRegion, MemorySource};
use crate::core::types::{
    Address, MemoryError, MemoryResult, ModuleInfo, ProcessArchitecture, ProcessInfo,
};
use crate::process::ProcessHandle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Addresses are written as hex strings; TOML integers stop at `i64::MAX`
mod address_text {
    use crate::core::types::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:X}", address.as_u64()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

fn default_architecture() -> ProcessArchitecture {
    ProcessArchitecture::Unknown
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProcess {
    pub pid: u32,
    pub name: String,
    #[serde(default = "default_architecture")]
    pub architecture: ProcessArchitecture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotModule {
    pub name: String,
    #[serde(with = "address_text")]
    pub base: Address,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRegion {
    #[serde(with = "address_text")]
    pub base: Address,
    /// Region bytes, hex encoded
    pub data: String,
    /// Unreadable regions are mapped but every read of them is denied
    #[serde(default = "default_true")]
    pub readable: bool,
}

/// On-disk snapshot document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub process: SnapshotProcess,
    #[serde(default)]
    pub modules: Vec<SnapshotModule>,
    #[serde(default)]
    pub regions: Vec<SnapshotRegion>,
}

impl Snapshot {
    /// Load a snapshot file
    pub fn load<P: AsRef<Path>>(path: P) -> MemoryResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let snapshot = Self::from_toml_str(&content)?;
        debug!(
            "Loaded snapshot {} ({} modules, {} regions)",
            path.display(),
            snapshot.modules.len(),
            snapshot.regions.len()
        );
        Ok(snapshot)
    }

    pub fn from_toml_str(content: &str) -> MemoryResult<Self> {
        toml::from_str(content).map_err(|e| MemoryError::SnapshotFormat(e.to_string()))
    }

    pub fn to_toml_string(&self) -> MemoryResult<String> {
        toml::to_string_pretty(self).map_err(|e| MemoryError::SnapshotFormat(e.to_string()))
    }

    /// Write the snapshot to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MemoryResult<()> {
        let content = self.to_toml_string()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Decode the regions and build a readable source
    pub fn into_source(self) -> MemoryResult<SnapshotSource> {
        SnapshotSource::from_snapshot(self)
    }
}

/// Offline process backed by a snapshot; both the handle and its memory
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    info: ProcessInfo,
    modules: Vec<ModuleInfo>,
    memory: BufferSource,
}

impl SnapshotSource {
    /// Load and decode a snapshot file
    pub fn open<P: AsRef<Path>>(path: P) -> MemoryResult<Self> {
        Snapshot::load(path)?.into_source()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> MemoryResult<Self> {
        let info = ProcessInfo::new(snapshot.process.pid, snapshot.process.name)
            .with_architecture(snapshot.process.architecture);

        let modules = snapshot
            .modules
            .into_iter()
            .map(|m| ModuleInfo::new(m.name, m.base, m.size))
            .collect();

        let mut memory = BufferSource::new();
        for region in snapshot.regions {
            let bytes = hex::decode(region.data.trim()).map_err(|e| {
                MemoryError::SnapshotFormat(format!("region at {}: {}", region.base, e))
            })?;
            if region.base.checked_add(bytes.len() as u64).is_none() {
                return Err(MemoryError::SnapshotFormat(format!(
                    "region at {} wraps the address space",
                    region.base
                )));
            }
            if !region.readable {
                memory.deny(MemoryRegion::new(region.base, bytes.len()));
            }
            memory.add_segment(region.base, bytes);
        }

        Ok(SnapshotSource {
            info,
            modules,
            memory,
        })
    }

    /// The underlying byte segments
    pub fn memory(&self) -> &BufferSource {
        &self.memory
    }
}

impl MemorySource for SnapshotSource {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        self.memory.read(region)
    }
}

impl ProcessHandle for SnapshotSource {
    fn info(&self) -> &ProcessInfo {
        &self.info
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        Ok(self.modules.clone())
    }
}

/// Assembles a snapshot in memory
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new(pid: u32, name: impl Into<String>, architecture: ProcessArchitecture) -> Self {
        SnapshotBuilder {
            snapshot: Snapshot {
                process: SnapshotProcess {
                    pid,
                    name: name.into(),
                    architecture,
                },
                modules: Vec::new(),
                regions: Vec::new(),
            },
        }
    }

    pub fn module(mut self, name: impl Into<String>, base: Address, size: u64) -> Self {
        self.snapshot.modules.push(SnapshotModule {
            name: name.into(),
            base,
            size,
        });
        self
    }

    pub fn region(mut self, base: Address, data: &[u8]) -> Self {
        self.snapshot.regions.push(SnapshotRegion {
            base,
            data: hex::encode(data),
            readable: true,
        });
        self
    }

    /// Adds a mapped range whose reads are denied
    pub fn protected_region(mut self, base: Address, data: &[u8]) -> Self {
        self.snapshot.regions.push(SnapshotRegion {
            base,
            data: hex::encode(data),
            readable: false,
        });
        self
    }

    pub fn build(self) -> Snapshot {
        self.snapshot
    }
}
