//! The memory-access capability every backend implements

use crate::core::types::{Address, MemoryResult};
use std::fmt;
use std::sync::Arc;

/// A byte range in the target's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRegion {
    pub address: Address,
    pub len: usize,
}

impl MemoryRegion {
    pub const fn new(address: Address, len: usize) -> Self {
        MemoryRegion { address, len }
    }

    /// One past the last byte, or `None` if the range wraps the address space
    pub fn end(&self) -> Option<Address> {
        self.address.checked_add(self.len as u64)
    }

    /// Checks whether `other` lies entirely inside this region
    pub fn contains(&self, other: &MemoryRegion) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => other.address >= self.address && other_end <= end,
            _ => false,
        }
    }

    /// Checks whether the two ranges share at least one byte
    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => other.address < end && self.address < other_end,
            _ => false,
        }
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+0x{:X}", self.address, self.len)
    }
}

/// Bounded-region reads from a target process.
///
/// Implementations must tolerate arbitrary addresses: unmapped ranges fail
/// with `InvalidAddress`, protected ones with `AccessDenied`, and neither may
/// abort the caller. Reads spanning page boundaries are handled internally.
/// Repeated reads of the same region have no side effects.
pub trait MemorySource: Send + Sync {
    /// Reads exactly `region.len` bytes starting at `region.address`
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>>;
}

impl<S: MemorySource + ?Sized> MemorySource for &S {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        (**self).read(region)
    }
}

impl<S: MemorySource + ?Sized> MemorySource for Box<S> {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        (**self).read(region)
    }
}

impl<S: MemorySource + ?Sized> MemorySource for Arc<S> {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        (**self).read(region)
    }
}
