//! procfs backend for live Linux targets
//!
//! Memory is read through `/proc/<pid>/mem`, modules come from
//! `/proc/<pid>/maps` and the architecture from the ELF header of
//! `/proc/<pid>/exe`.

use crate::core::types::{
    Address, MemoryError, MemoryResult, ModuleInfo, ProcessArchitecture, ProcessId, ProcessInfo,
};
use crate::process::handle::process_name_matches;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub path: Option<String>,
}

impl MapEntry {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_readable(&self) -> bool {
        self.perms.starts_with('r')
    }
}

/// Parse the text of a maps file; malformed lines are skipped
pub fn parse_maps(text: &str) -> Vec<MapEntry> {
    let mut entries = Vec::new();

    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let addr_parts: Vec<&str> = parts[0].split('-').collect();
        if addr_parts.len() != 2 {
            continue;
        }

        let (start, end) = match (
            u64::from_str_radix(addr_parts[0], 16),
            u64::from_str_radix(addr_parts[1], 16),
        ) {
            (Ok(start), Ok(end)) if end >= start => (start, end),
            _ => continue,
        };
        let perms = parts.get(1).unwrap_or(&"").to_string();
        let offset = parts
            .get(2)
            .and_then(|s| u64::from_str_radix(s, 16).ok())
            .unwrap_or(0);
        // Paths may contain spaces; everything after the inode column is the path
        let path = if parts.len() > 5 {
            Some(parts[5..].join(" "))
        } else {
            None
        };

        entries.push(MapEntry {
            start,
            end,
            perms,
            offset,
            path,
        });
    }

    entries
}

/// Collapse file-backed mappings into one module per file.
///
/// A module spans from its lowest to its highest mapping; the base is the
/// start of the lowest one. Pseudo paths such as `[heap]` are not modules.
pub fn modules_from_maps(entries: &[MapEntry]) -> Vec<ModuleInfo> {
    let mut spans: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for entry in entries {
        let path = match entry.path.as_deref() {
            Some(p) if p.starts_with('/') => p,
            _ => continue,
        };
        let span = spans.entry(path).or_insert((entry.start, entry.end));
        span.0 = span.0.min(entry.start);
        span.1 = span.1.max(entry.end);
    }

    let mut modules: Vec<ModuleInfo> = spans
        .into_iter()
        .map(|(path, (start, end))| {
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            let mut module = ModuleInfo::new(name, Address::new(start), end - start);
            module.path = Some(PathBuf::from(path));
            module
        })
        .collect();
    modules.sort_by_key(|m| m.base_address);
    modules
}

/// Architecture from the first bytes of an ELF image
pub fn elf_architecture(header: &[u8]) -> ProcessArchitecture {
    if header.len() < 20 || &header[..4] != b"\x7fELF" {
        return ProcessArchitecture::Unknown;
    }
    let machine = match header[5] {
        1 => u16::from_le_bytes([header[18], header[19]]),
        2 => u16::from_be_bytes([header[18], header[19]]),
        _ => return ProcessArchitecture::Unknown,
    };
    match (header[4], machine) {
        (1, 0x03) => ProcessArchitecture::X86,
        (2, 0x3E) => ProcessArchitecture::X64,
        (1, 0x28) => ProcessArchitecture::ARM,
        (2, 0xB7) => ProcessArchitecture::ARM64,
        _ => ProcessArchitecture::Unknown,
    }
}

fn read_architecture(pid: ProcessId) -> ProcessArchitecture {
    let mut header = [0u8; 20];
    match File::open(format!("/proc/{}/exe", pid)).and_then(|mut f| f.read_exact(&mut header)) {
        Ok(()) => elf_architecture(&header),
        Err(e) => {
            debug!("Could not read ELF header of pid {}: {}", pid, e);
            ProcessArchitecture::Unknown
        }
    }
}

fn read_comm(pid: ProcessId) -> Option<String> {
    fs::read_to_string(format!("/proc/{}/comm", pid))
        .ok()
        .map(|s| s.trim_end().to_string())
}

fn process_alive(pid: ProcessId) -> bool {
    // Third field of stat is the state; zombies and dead tasks have no memory
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => match stat.rfind(')') {
            Some(end) => !matches!(stat[end + 1..].trim_start().chars().next(), Some('Z' | 'X')),
            None => false,
        },
        Err(_) => false,
    }
}

/// List running processes
pub fn enumerate_processes() -> MemoryResult<Vec<ProcessInfo>> {
    let mut processes = Vec::new();
    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        let pid: ProcessId = match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            Some(pid) => pid,
            None => continue,
        };
        if let Some(name) = read_comm(pid) {
            let mut info = ProcessInfo::new(pid, name);
            info.path = fs::read_link(format!("/proc/{}/exe", pid)).ok();
            processes.push(info);
        }
    }
    Ok(processes)
}

/// Find the first process whose name or executable file name matches
pub fn find_process_by_name(name: &str) -> MemoryResult<ProcessId> {
    let mut candidates: Vec<ProcessInfo> = enumerate_processes()?
        .into_iter()
        .filter(|p| {
            // comm is truncated to 15 bytes; fall back to the executable name
            process_name_matches(&p.name, name)
                || p
                    .path
                    .as_ref()
                    .and_then(|path| path.file_name())
                    .map(|f| process_name_matches(&f.to_string_lossy(), name))
                    .unwrap_or(false)
        })
        .collect();
    candidates.sort_by_key(|p| p.pid);
    candidates
        .first()
        .map(|p| p.pid)
        .ok_or_else(|| MemoryError::ProcessUnavailable(format!("no process named {}", name)))
}

/// An open Linux process
#[derive(Debug)]
pub struct ProcMem {
    info: ProcessInfo,
    mem: File,
}

impl ProcMem {
    /// Open `/proc/<pid>/mem` for reading
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let name = read_comm(pid)
            .ok_or_else(|| MemoryError::ProcessUnavailable(format!("pid {}", pid)))?;
        let mem = File::open(format!("/proc/{}/mem", pid)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MemoryError::ProcessUnavailable(format!("pid {}", pid)),
            io::ErrorKind::PermissionDenied => MemoryError::access_denied(
                Address::null(),
                format!("cannot open /proc/{}/mem; ptrace access is required", pid),
            ),
            _ => MemoryError::IoError(e),
        })?;

        let mut info = ProcessInfo::new(pid, name).with_architecture(read_architecture(pid));
        info.path = fs::read_link(format!("/proc/{}/exe", pid)).ok();
        debug!(
            "Opened pid {} ({}, {:?})",
            pid, info.name, info.architecture
        );
        Ok(ProcMem { info, mem })
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.info
    }

    pub fn is_alive(&self) -> bool {
        process_alive(self.info.pid)
    }

    pub fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        match fs::read_to_string(format!("/proc/{}/maps", self.info.pid)) {
            Ok(text) => Ok(modules_from_maps(&parse_maps(&text))),
            Err(_) if !self.is_alive() => Err(MemoryError::ProcessUnavailable(format!(
                "pid {} has exited",
                self.info.pid
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            let at = address
                .checked_add(filled as u64)
                .ok_or_else(|| MemoryError::invalid_address(address, len))?;
            match self.mem.read_at(&mut buffer[filled..], at.as_u64()) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if filled > 0 {
                        return Err(MemoryError::partial_read(address, len, filled));
                    }
                    return Err(self.map_read_error(address, len, e));
                }
            }
        }

        if filled == len {
            Ok(buffer)
        } else if !self.is_alive() {
            Err(MemoryError::ProcessUnavailable(format!(
                "pid {} has exited",
                self.info.pid
            )))
        } else if filled == 0 {
            Err(MemoryError::invalid_address(address, len))
        } else {
            Err(MemoryError::partial_read(address, len, filled))
        }
    }

    fn map_read_error(&self, address: Address, len: usize, error: io::Error) -> MemoryError {
        if !self.is_alive() {
            return MemoryError::ProcessUnavailable(format!("pid {} has exited", self.info.pid));
        }
        match error.raw_os_error() {
            // EIO: unmapped page, EINVAL: offset outside the address space
            Some(5) | Some(22) => MemoryError::invalid_address(address, len),
            // EPERM, EACCES
            Some(1) | Some(13) => MemoryError::access_denied(address, error.to_string()),
            // ESRCH
            Some(3) => {
                MemoryError::ProcessUnavailable(format!("pid {} has exited", self.info.pid))
            }
            _ => MemoryError::IoError(error),
        }
    }
}
