//! Read-caching decorator for memory sources

use super::source::{MemoryRegion, MemorySource};
use crate::core::types::{Address, MemoryResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache entry for read operations
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    timestamp: Instant,
    /// Matches the queue slot that is current for this address
    generation: u64,
}

/// Read cache for frequently accessed memory regions.
///
/// Eviction is first-in first-out. `order` may hold stale slots for
/// addresses that were re-inserted; they are skipped on eviction and
/// compacted once they outnumber the live entries.
#[derive(Debug)]
pub struct ReadCache {
    entries: HashMap<Address, CacheEntry>,
    order: VecDeque<(Address, u64)>,
    next_generation: u64,
    max_age: Duration,
    max_entries: usize,
}

impl ReadCache {
    /// Create a new read cache
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        ReadCache {
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_generation: 0,
            max_age,
            max_entries,
        }
    }

    /// Get cached data if available and not expired
    pub fn get(&self, address: Address, size: usize) -> Option<Vec<u8>> {
        let entry = self.entries.get(&address)?;
        if entry.data.len() >= size && entry.timestamp.elapsed() < self.max_age {
            return Some(entry.data[..size].to_vec());
        }
        None
    }

    /// Store data in cache
    pub fn put(&mut self, address: Address, data: Vec<u8>) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&address) {
            self.evict_oldest();
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(
            address,
            CacheEntry {
                data,
                timestamp: Instant::now(),
                generation,
            },
        );
        self.order.push_back((address, generation));

        if self.order.len() > 2 * self.max_entries {
            let entries = &self.entries;
            self.order
                .retain(|(addr, gen)| entries.get(addr).map(|e| e.generation) == Some(*gen));
        }
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Get cache size
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    fn evict_oldest(&mut self) {
        while let Some((address, generation)) = self.order.pop_front() {
            let current = self.entries.get(&address).map(|e| e.generation);
            if current == Some(generation) {
                self.entries.remove(&address);
                return;
            }
        }
    }
}

/// Memory source decorator that serves repeated reads from a `ReadCache`.
///
/// Only successful reads are cached. Callers that need to observe a changing
/// live target should keep `max_age` short or skip the decorator.
pub struct CachedSource<S> {
    inner: S,
    cache: Mutex<ReadCache>,
}

impl<S: MemorySource> CachedSource<S> {
    pub fn new(inner: S, max_entries: usize, max_age: Duration) -> Self {
        CachedSource {
            inner,
            cache: Mutex::new(ReadCache::new(max_entries, max_age)),
        }
    }

    /// Number of cached reads
    pub fn cache_size(&self) -> usize {
        self.cache.lock().map(|c| c.size()).unwrap_or(0)
    }

    /// Drop all cached reads
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: MemorySource> MemorySource for CachedSource<S> {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(region.address, region.len) {
                return Ok(hit);
            }
        }

        let data = self.inner.read(region)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(region.address, data.clone());
        }
        Ok(data)
    }
}
