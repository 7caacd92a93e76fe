//! The attached-target capability

use crate::core::types::{MemoryResult, ModuleInfo, ProcessId, ProcessInfo};

/// An attached target process.
///
/// The handle is owned by the caller; memory sources borrow the target
/// through it. After the target exits `is_alive` turns false and module
/// enumeration fails with `ProcessUnavailable`, never a crash.
pub trait ProcessHandle: Send + Sync {
    /// Identity of the target captured at attach time
    fn info(&self) -> &ProcessInfo;

    /// Whether the target is still running
    fn is_alive(&self) -> bool;

    /// Modules currently loaded in the target
    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>>;

    fn pid(&self) -> ProcessId {
        self.info().pid
    }

    fn name(&self) -> &str {
        &self.info().name
    }
}

/// Process name policy: exact match, tolerating a missing or extra `.exe`
/// suffix on either side (`game` finds `game.exe` and vice versa).
pub fn process_name_matches(candidate: &str, query: &str) -> bool {
    fn strip_exe(name: &str) -> &str {
        let len = name.len();
        if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe")
        {
            &name[..len - 4]
        } else {
            name
        }
    }
    candidate == query || strip_exe(candidate) == strip_exe(query)
}
