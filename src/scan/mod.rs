//! Scan entry points
//!
//! `run_scan` is the boundary used by embedding callers: attach to a target
//! by name, scan one module and return its catalog. `run_scan_async` runs
//! the same scan on tokio's blocking pool and `scan_many` runs independent
//! scans side by side.

pub mod coordinator;
pub mod events;

pub use coordinator::{ScanCoordinator, ScanOutcome, ScanReport};
pub use events::{
    CancellationToken, EventSink, LogLevel, NullSink, ScanEvent, ScanProgress, ScanState,
};

use crate::config::{validate_config, Config};
use crate::core::types::ScanError;
use crate::process::{attach, MemorySourceKind};
use events::Emitter;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// What to scan and how to read it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub process_name: String,
    pub module_name: String,
    pub source: MemorySourceKind,
}

impl ScanRequest {
    /// Scan a running process
    pub fn new(process_name: impl Into<String>, module_name: impl Into<String>) -> Self {
        ScanRequest {
            process_name: process_name.into(),
            module_name: module_name.into(),
            source: MemorySourceKind::Direct,
        }
    }

    /// Read from a snapshot file instead of the live process
    pub fn from_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = MemorySourceKind::Snapshot(path.into());
        self
    }
}

/// Attach to the requested process and scan one module.
///
/// Blocks the calling thread until the scan ends. Events go to `sink`.
pub fn run_scan(
    request: &ScanRequest,
    config: &Config,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    let emitter = Emitter::new(sink, &request.module_name);
    if let Err(e) = validate_config(config) {
        let error = ScanError::Config(e.to_string());
        emitter.error(error.to_string());
        emitter.state(ScanState::Failed);
        return Err(error);
    }

    debug!(
        "Scanning {} in {} ({:?})",
        request.module_name, request.process_name, request.source
    );
    let attached = match attach(&request.process_name, &request.source, &config.memory) {
        Ok(attached) => attached,
        Err(e) => {
            let error = ScanError::from(e);
            emitter.error(error.to_string());
            emitter.state(ScanState::Failed);
            return Err(error);
        }
    };

    ScanCoordinator::new(config).scan(
        attached.process.as_ref(),
        attached.source.as_ref(),
        &request.module_name,
        sink,
        cancel,
    )
}

/// `run_scan` on tokio's blocking thread pool
pub async fn run_scan_async(
    request: ScanRequest,
    config: Config,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    tokio::task::spawn_blocking(move || run_scan(&request, &config, sink.as_ref(), &cancel))
        .await
        .map_err(|e| ScanError::Worker(e.to_string()))?
}

/// Run independent scans in parallel on a pool of `scan.max_workers`
/// threads. Results are in request order.
pub fn scan_many(
    requests: &[ScanRequest],
    config: &Config,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<Vec<Result<ScanOutcome, ScanError>>, ScanError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.scan.max_workers.max(1))
        .thread_name(|i| format!("typescope-scan-{}", i))
        .build()
        .map_err(|e| ScanError::Worker(e.to_string()))?;

    Ok(pool.install(|| {
        requests
            .par_iter()
            .map(|request| run_scan(request, config, sink, cancel))
            .collect()
    }))
}
