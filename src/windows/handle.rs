//! Owned HANDLE wrapper with automatic cleanup

use std::ptr;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winnt::HANDLE;

/// Owned Windows HANDLE, closed on drop
pub struct Handle {
    handle: HANDLE,
}

impl Handle {
    /// Wraps a handle returned by the OS; invalid values become null
    pub fn new(handle: HANDLE) -> Self {
        if handle == INVALID_HANDLE_VALUE {
            Handle {
                handle: ptr::null_mut(),
            }
        } else {
            Handle { handle }
        }
    }

    /// Check if handle is null
    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    /// Get the raw handle
    pub fn raw(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            // Ignore errors on cleanup
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}

// Send + Sync are safe because HANDLEs are process-wide
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}
