//! Win32 backend for live Windows targets
//!
//! Memory is read with `ReadProcessMemory`; processes and modules are
//! enumerated through ToolHelp32 snapshots. All unsafe FFI calls are
//! contained within this module.

mod handle;

pub use handle::Handle;

use crate::core::types::{
    Address, MemoryError, MemoryResult, ModuleInfo, ProcessArchitecture, ProcessId, ProcessInfo,
};
use crate::process::handle::process_name_matches;
use std::ffi::OsString;
use std::mem;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;
use tracing::debug;
use winapi::shared::minwindef::{DWORD, FALSE, LPCVOID, LPVOID};
use winapi::shared::winerror::{
    ERROR_ACCESS_DENIED, ERROR_BAD_LENGTH, ERROR_INVALID_HANDLE, ERROR_NOACCESS,
    ERROR_PARTIAL_COPY,
};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::memoryapi::ReadProcessMemory;
use winapi::um::minwinbase::STILL_ACTIVE;
use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Process32FirstW, Process32NextW,
    MODULEENTRY32W, PROCESSENTRY32W, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use winapi::um::winnt::{PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};
use winapi::um::wow64apiset::IsWow64Process;

/// Convert Windows wide string (UTF-16) to Rust string
pub fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    OsString::from_wide(&wide[..len])
        .to_string_lossy()
        .into_owned()
}

fn host_architecture() -> ProcessArchitecture {
    #[cfg(target_arch = "x86_64")]
    {
        ProcessArchitecture::X64
    }
    #[cfg(target_arch = "aarch64")]
    {
        ProcessArchitecture::ARM64
    }
    #[cfg(target_arch = "x86")]
    {
        ProcessArchitecture::X86
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")))]
    {
        ProcessArchitecture::Unknown
    }
}

/// List running processes
pub fn enumerate_processes() -> MemoryResult<Vec<ProcessInfo>> {
    unsafe {
        let snapshot = Handle::new(CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0));
        if snapshot.is_null() {
            return Err(MemoryError::InvalidHandle(
                "Failed to create process snapshot".to_string(),
            ));
        }

        let mut processes = Vec::new();
        let mut entry: PROCESSENTRY32W = mem::zeroed();
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as DWORD;

        let mut ok = Process32FirstW(snapshot.raw(), &mut entry);
        while ok != FALSE {
            processes.push(ProcessInfo::new(
                entry.th32ProcessID,
                wide_to_string(&entry.szExeFile),
            ));
            ok = Process32NextW(snapshot.raw(), &mut entry);
        }
        Ok(processes)
    }
}

/// Find the first process whose executable name matches
pub fn find_process_by_name(name: &str) -> MemoryResult<ProcessId> {
    enumerate_processes()?
        .into_iter()
        .filter(|p| p.pid != 0 && process_name_matches(&p.name, name))
        .map(|p| p.pid)
        .min()
        .ok_or_else(|| MemoryError::ProcessUnavailable(format!("no process named {}", name)))
}

/// An open Windows process
pub struct WinProcess {
    info: ProcessInfo,
    handle: Handle,
}

impl WinProcess {
    /// Open a process for querying and reading memory
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let name = enumerate_processes()?
            .into_iter()
            .find(|p| p.pid == pid)
            .map(|p| p.name)
            .ok_or_else(|| MemoryError::ProcessUnavailable(format!("pid {}", pid)))?;

        let handle = unsafe {
            Handle::new(OpenProcess(
                PROCESS_QUERY_INFORMATION | PROCESS_VM_READ,
                FALSE,
                pid,
            ))
        };
        if handle.is_null() {
            let code = unsafe { GetLastError() };
            return Err(if code == ERROR_ACCESS_DENIED {
                MemoryError::access_denied(Address::null(), format!("OpenProcess({})", pid))
            } else {
                MemoryError::ProcessUnavailable(format!("OpenProcess({}) failed: {}", pid, code))
            });
        }

        let mut is_wow64 = FALSE;
        let architecture = if unsafe { IsWow64Process(handle.raw(), &mut is_wow64) } == FALSE {
            ProcessArchitecture::Unknown
        } else if is_wow64 != FALSE {
            ProcessArchitecture::X86
        } else {
            host_architecture()
        };

        let info = ProcessInfo::new(pid, name).with_architecture(architecture);
        debug!(
            "Opened pid {} ({}, {:?})",
            pid, info.name, info.architecture
        );
        Ok(WinProcess { info, handle })
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.info
    }

    pub fn is_alive(&self) -> bool {
        let mut code: DWORD = 0;
        unsafe { GetExitCodeProcess(self.handle.raw(), &mut code) != FALSE && code == STILL_ACTIVE }
    }

    pub fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        if !self.is_alive() {
            return Err(MemoryError::ProcessUnavailable(format!(
                "pid {} has exited",
                self.info.pid
            )));
        }

        unsafe {
            // The module snapshot fails with ERROR_BAD_LENGTH while the loader is busy
            let mut snapshot = Handle::new(std::ptr::null_mut());
            for _ in 0..8 {
                snapshot = Handle::new(CreateToolhelp32Snapshot(
                    TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32,
                    self.info.pid,
                ));
                if !snapshot.is_null() || GetLastError() != ERROR_BAD_LENGTH {
                    break;
                }
            }
            if snapshot.is_null() {
                return Err(MemoryError::InvalidHandle(format!(
                    "Failed to create module snapshot for pid {}",
                    self.info.pid
                )));
            }

            let mut modules = Vec::new();
            let mut entry: MODULEENTRY32W = mem::zeroed();
            entry.dwSize = mem::size_of::<MODULEENTRY32W>() as DWORD;

            let mut ok = Module32FirstW(snapshot.raw(), &mut entry);
            while ok != FALSE {
                let mut module = ModuleInfo::new(
                    wide_to_string(&entry.szModule),
                    Address::new(entry.modBaseAddr as usize as u64),
                    u64::from(entry.modBaseSize),
                );
                module.path = Some(PathBuf::from(wide_to_string(&entry.szExePath)));
                modules.push(module);
                ok = Module32NextW(snapshot.raw(), &mut entry);
            }
            Ok(modules)
        }
    }

    pub fn read(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        let base = usize::try_from(address.as_u64())
            .map_err(|_| MemoryError::invalid_address(address, len))?;
        let mut buffer = vec![0u8; len];
        let mut bytes_read = 0;

        let result = unsafe {
            ReadProcessMemory(
                self.handle.raw(),
                base as LPCVOID,
                buffer.as_mut_ptr() as LPVOID,
                len,
                &mut bytes_read,
            )
        };

        if result != FALSE && bytes_read == len {
            return Ok(buffer);
        }

        let code = unsafe { GetLastError() };
        if !self.is_alive() {
            return Err(MemoryError::ProcessUnavailable(format!(
                "pid {} has exited",
                self.info.pid
            )));
        }
        Err(match code {
            _ if bytes_read > 0 => MemoryError::partial_read(address, len, bytes_read),
            ERROR_PARTIAL_COPY => MemoryError::invalid_address(address, len),
            ERROR_NOACCESS | ERROR_ACCESS_DENIED => {
                MemoryError::access_denied(address, format!("ReadProcessMemory error {}", code))
            }
            ERROR_INVALID_HANDLE => {
                MemoryError::InvalidHandle("Process handle is no longer valid".to_string())
            }
            _ => MemoryError::invalid_address(address, len),
        })
    }
}
