//! Live target processes on the host OS

use super::handle::ProcessHandle;
use crate::core::types::{MemoryResult, ModuleInfo, ProcessId, ProcessInfo};
use crate::memory::{MemoryRegion, MemorySource};

#[cfg(target_os = "linux")]
use crate::linux::{self as platform, ProcMem as PlatformProcess};

#[cfg(windows)]
use crate::windows::{self as platform, WinProcess as PlatformProcess};

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use crate::core::types::{
        Address, MemoryError, MemoryResult, ModuleInfo, ProcessId, ProcessInfo,
    };

    fn unsupported<T>() -> MemoryResult<T> {
        Err(MemoryError::UnsupportedOperation(
            "live process access is not available on this platform".to_string(),
        ))
    }

    pub fn find_process_by_name(_name: &str) -> MemoryResult<ProcessId> {
        unsupported()
    }

    pub struct PlatformProcess {
        info: ProcessInfo,
    }

    impl PlatformProcess {
        pub fn open(_pid: ProcessId) -> MemoryResult<Self> {
            unsupported()
        }

        pub fn info(&self) -> &ProcessInfo {
            &self.info
        }

        pub fn is_alive(&self) -> bool {
            false
        }

        pub fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
            unsupported()
        }

        pub fn read(&self, _address: Address, _len: usize) -> MemoryResult<Vec<u8>> {
            unsupported()
        }
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
use platform::PlatformProcess;

/// A running process on this machine; both the handle and its memory
pub struct LiveProcess {
    inner: PlatformProcess,
}

impl LiveProcess {
    /// Attach to a process by id
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        Ok(LiveProcess {
            inner: PlatformProcess::open(pid)?,
        })
    }

    /// Attach to the first process with a matching name
    pub fn find(name: &str) -> MemoryResult<Self> {
        let pid = platform::find_process_by_name(name)?;
        Self::open(pid)
    }
}

impl ProcessHandle for LiveProcess {
    fn info(&self) -> &ProcessInfo {
        self.inner.info()
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        self.inner.modules()
    }
}

impl MemorySource for LiveProcess {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        if region.len == 0 {
            return Ok(Vec::new());
        }
        self.inner.read(region.address, region.len)
    }
}
