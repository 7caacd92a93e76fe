//! Memory access layer
//!
//! This module provides the pluggable read abstraction every other layer
//! goes through:
//! - `MemorySource`, the single-method read capability
//! - in-memory and snapshot-file sources for offline use and tests
//! - caching and timeout decorators for live targets
//! - typed reads in the target's byte order and pointer width

pub mod buffer;
pub mod cache;
pub mod reader;
pub mod snapshot;
pub mod source;
pub mod timeout;

pub use buffer::BufferSource;
pub use cache::{CachedSource, ReadCache};
pub use reader::{Endian, TargetReader};
pub use snapshot::{Snapshot, SnapshotBuilder, SnapshotSource};
pub use source::{MemoryRegion, MemorySource};
pub use timeout::TimeoutSource;

use crate::config::MemoryConfig;
use crate::core::types::MemoryResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wrap a source in the decorators enabled by `config`.
///
/// The cache sits outside the timeout so cache hits never touch the worker.
pub fn decorate(
    source: Arc<dyn MemorySource>,
    config: &MemoryConfig,
) -> MemoryResult<Arc<dyn MemorySource>> {
    let mut source = source;
    if config.read_timeout_ms > 0 {
        debug!(
            "Bounding reads to {} ms on {} workers",
            config.read_timeout_ms, config.read_workers
        );
        source = Arc::new(TimeoutSource::with_workers(
            source,
            Duration::from_millis(config.read_timeout_ms),
            config.read_workers,
        )?);
    }
    if config.cache_enabled {
        debug!(
            "Caching up to {} reads for {} ms",
            config.cache_entries, config.cache_max_age_ms
        );
        source = Arc::new(CachedSource::new(
            source,
            config.cache_entries,
            Duration::from_millis(config.cache_max_age_ms),
        ));
    }
    Ok(source)
}
