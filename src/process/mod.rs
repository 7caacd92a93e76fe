//! Target process acquisition
//!
//! This module turns a process name plus a source kind into an attached
//! `ProcessHandle` and the `MemorySource` used to read it, wrapped in the
//! decorators the memory configuration asks for.

pub mod handle;
pub mod live;

pub use handle::{process_name_matches, ProcessHandle};
pub use live::LiveProcess;

use crate::config::MemoryConfig;
use crate::core::types::{MemoryError, MemoryResult};
use crate::memory::{self, MemorySource, SnapshotSource};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Where the bytes of a target come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySourceKind {
    /// Read the running process through the OS
    Direct,
    /// Read a snapshot file captured earlier
    Snapshot(PathBuf),
}

/// An attached target and the source used to read it
#[derive(Clone)]
pub struct Attached {
    pub process: Arc<dyn ProcessHandle>,
    pub source: Arc<dyn MemorySource>,
}

/// Attach to `process_name` using the given source kind
pub fn attach(
    process_name: &str,
    kind: &MemorySourceKind,
    config: &MemoryConfig,
) -> MemoryResult<Attached> {
    match kind {
        MemorySourceKind::Direct => {
            let process = Arc::new(LiveProcess::find(process_name)?);
            info!(
                "Attached to {} (pid {})",
                process.name(),
                process.pid()
            );
            let source = memory::decorate(process.clone(), config)?;
            Ok(Attached { process, source })
        }
        MemorySourceKind::Snapshot(path) => {
            let snapshot = Arc::new(SnapshotSource::open(path)?);
            if !process_name_matches(snapshot.name(), process_name) {
                return Err(MemoryError::ProcessUnavailable(format!(
                    "snapshot {} holds {}, not {}",
                    path.display(),
                    snapshot.name(),
                    process_name
                )));
            }
            info!(
                "Opened snapshot {} of {} (pid {})",
                path.display(),
                snapshot.name(),
                snapshot.pid()
            );
            // Snapshot reads are already in memory; only the size limits apply
            let config = MemoryConfig {
                read_timeout_ms: 0,
                cache_enabled: false,
                ..config.clone()
            };
            let source = memory::decorate(snapshot.clone(), &config)?;
            Ok(Attached {
                process: snapshot,
                source,
            })
        }
    }
}
