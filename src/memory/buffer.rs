//! In-memory source backed by fixed byte segments
//!
//! The test double for `MemorySource`: segments are placed at arbitrary
//! target addresses, reads that cross from one segment into an adjacent one
//! are stitched together, and ranges can be marked as protected to simulate
//! `AccessDenied`.

use super::source::{MemoryRegion, MemorySource};
use crate::core::types::{Address, MemoryError, MemoryResult};
use std::collections::BTreeMap;

/// Memory source over a set of byte segments
#[derive(Debug, Clone, Default)]
pub struct BufferSource {
    segments: BTreeMap<u64, Vec<u8>>,
    denied: Vec<MemoryRegion>,
}

impl BufferSource {
    /// Creates an empty source; every read fails with `InvalidAddress`
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source with a single segment
    pub fn with_segment(base: Address, data: Vec<u8>) -> Self {
        let mut source = Self::new();
        source.add_segment(base, data);
        source
    }

    /// Maps `data` at `base`, replacing any segment that starts at the same address
    pub fn add_segment(&mut self, base: Address, data: Vec<u8>) {
        self.segments.insert(base.as_u64(), data);
    }

    /// Marks a range as protected; reads touching it fail with `AccessDenied`
    pub fn deny(&mut self, region: MemoryRegion) {
        self.denied.push(region);
    }

    /// Iterates mapped segments in address order
    pub fn segments(&self) -> impl Iterator<Item = (Address, &[u8])> {
        self.segments
            .iter()
            .map(|(base, data)| (Address::new(*base), data.as_slice()))
    }

    /// Iterates protected ranges
    pub fn denied(&self) -> &[MemoryRegion] {
        &self.denied
    }

    /// Total number of mapped bytes
    pub fn mapped_len(&self) -> usize {
        self.segments.values().map(Vec::len).sum()
    }

    fn segment_at(&self, address: u64) -> Option<(u64, &[u8])> {
        let (base, data) = self.segments.range(..=address).next_back()?;
        let end = base.checked_add(data.len() as u64)?;
        if address < end {
            Some((*base, data.as_slice()))
        } else {
            None
        }
    }
}

impl MemorySource for BufferSource {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        if region.len == 0 {
            return Ok(Vec::new());
        }
        let end = region
            .end()
            .ok_or_else(|| MemoryError::invalid_address(region.address, region.len))?
            .as_u64();

        if let Some(denied) = self.denied.iter().find(|d| d.overlaps(&region)) {
            return Err(MemoryError::access_denied(
                region.address,
                format!("range {} is protected", denied),
            ));
        }

        let mut out = Vec::with_capacity(region.len);
        let mut cursor = region.address.as_u64();
        while cursor < end {
            let (base, data) = self
                .segment_at(cursor)
                .ok_or_else(|| MemoryError::invalid_address(region.address, region.len))?;
            let start = (cursor - base) as usize;
            let take = ((end - cursor) as usize).min(data.len() - start);
            out.extend_from_slice(&data[start..start + take]);
            cursor += take as u64;
        }
        Ok(out)
    }
}
