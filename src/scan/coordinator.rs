//! Drives one scan from module lookup to a finished catalog

use super::events::{CancellationToken, Emitter, EventSink, ScanProgress, ScanState};
use crate::catalog::{CatalogBuilder, CatalogError, TypeCatalog};
use crate::config::Config;
use crate::core::types::{Address, ModuleInfo, PointerWidth, RowError, ScanError};
use crate::memory::MemorySource;
use crate::metadata::{decode, DecodeOptions, DecodedType, ModuleLocator};
use crate::process::ProcessHandle;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a completed scan
#[derive(Debug)]
pub struct ScanReport {
    pub module: ModuleInfo,
    pub catalog: Arc<TypeCatalog>,
    /// Rows that failed to decode, in row order
    pub row_errors: Vec<RowError>,
    /// Full names seen more than once; the first row kept the name
    pub duplicates: Vec<String>,
    /// Row count declared by the table header
    pub rows_total: u32,
    pub duration: Duration,
}

/// Terminal outcome of a scan that did not fail
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(ScanReport),
    /// Stopped on request; no catalog is produced
    Cancelled,
}

impl ScanOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanOutcome::Cancelled)
    }

    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            ScanOutcome::Completed(report) => Some(report),
            ScanOutcome::Cancelled => None,
        }
    }

    pub fn into_report(self) -> Option<ScanReport> {
        match self {
            ScanOutcome::Completed(report) => Some(report),
            ScanOutcome::Cancelled => None,
        }
    }

    pub fn catalog(&self) -> Option<Arc<TypeCatalog>> {
        self.report().map(|r| Arc::clone(&r.catalog))
    }
}

/// Runs scans with a fixed configuration; holds no per-scan state
#[derive(Debug, Clone)]
pub struct ScanCoordinator {
    locator: ModuleLocator,
    config: Config,
}

impl ScanCoordinator {
    pub fn new(config: &Config) -> Self {
        ScanCoordinator {
            locator: ModuleLocator::from_config(config),
            config: config.clone(),
        }
    }

    pub fn locator(&self) -> &ModuleLocator {
        &self.locator
    }

    /// Locate `module_name` in the target, decode its type table and build
    /// the catalog.
    ///
    /// Row failures are reported and skipped. Failing to find the module or
    /// to read the table header fails the scan, as does the target exiting
    /// while rows are read.
    pub fn scan(
        &self,
        process: &dyn ProcessHandle,
        source: &dyn MemorySource,
        module_name: &str,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        let emitter = Emitter::new(sink, module_name);
        if cancel.is_cancelled() {
            return Ok(cancelled(&emitter, 0));
        }

        emitter.state(ScanState::Locating);
        let module = match self.locator.locate(process, source, module_name) {
            Ok(module) => module,
            Err(e) => return Err(fail(&emitter, e.into())),
        };
        let root = match module.metadata_root {
            Some(root) => root,
            None => {
                return Err(fail(
                    &emitter,
                    ScanError::NoMetadata {
                        module: module.name.clone(),
                        reason: "no metadata root".to_string(),
                    },
                ))
            }
        };
        emitter.info(format!(
            "Found {} at {} in {} (pid {}), metadata root at {}",
            module.name,
            module.base_address,
            process.name(),
            process.pid(),
            root
        ));

        let expected_width = process.info().architecture.pointer_width();
        self.decode_into_catalog(module, root, source, expected_width, &emitter, cancel)
    }

    /// Decode from a metadata root that is already known
    pub fn scan_root(
        &self,
        module: ModuleInfo,
        root: Address,
        source: &dyn MemorySource,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        let name = module.name.clone();
        let emitter = Emitter::new(sink, &name);
        if cancel.is_cancelled() {
            return Ok(cancelled(&emitter, 0));
        }
        self.decode_into_catalog(module, root, source, None, &emitter, cancel)
    }

    /// Scan several modules of one target in parallel on the current rayon
    /// pool. Results are in the order of `module_names`.
    pub fn scan_modules(
        &self,
        process: &dyn ProcessHandle,
        source: &dyn MemorySource,
        module_names: &[&str],
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Vec<Result<ScanOutcome, ScanError>> {
        module_names
            .par_iter()
            .map(|name| self.scan(process, source, name, sink, cancel))
            .collect()
    }

    fn decode_into_catalog(
        &self,
        module: ModuleInfo,
        root: Address,
        source: &dyn MemorySource,
        expected_width: Option<PointerWidth>,
        emitter: &Emitter<'_>,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let module_name = module.stem().to_string();
        let options = DecodeOptions::from_config(&self.config, module_name.clone());

        let mut rows = match decode(source, root, &options) {
            Ok(rows) => rows,
            Err(e) => return Err(fail(emitter, e.into())),
        };
        let total = rows.total();

        if let Some(expected) = expected_width {
            if expected != rows.pointer_width() {
                emitter.warn(format!(
                    "Metadata declares {}-bit pointers but the process is {}-bit; using the metadata",
                    rows.pointer_width().bytes() * 8,
                    expected.bytes() * 8
                ));
            }
        }

        emitter.state(ScanState::Decoding);
        emitter.info(format!(
            "Decoding {} type rows ({}-bit, {:?} endian)",
            total,
            rows.pointer_width().bytes() * 8,
            rows.header().endian
        ));

        let interval = self.config.scan.progress_interval.max(1);
        let mut decoded: Vec<DecodedType> = Vec::with_capacity((total as usize).min(4096));
        let mut row_errors = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Ok(cancelled(emitter, rows.position()));
            }
            let row = match rows.next() {
                Some(row) => row,
                None => break,
            };
            match row {
                Ok(definition) => decoded.push(definition),
                Err(e) => {
                    if let Some(reason) = e.error.process_gone() {
                        let reason = reason.to_string();
                        return Err(fail(emitter, ScanError::ProcessUnavailable(reason)));
                    }
                    emitter.warn(format!("Skipping {}", e));
                    row_errors.push(e);
                }
            }

            let processed = rows.position();
            if processed < total && processed % interval == 0 {
                emitter.progress(ScanProgress::new(processed, total));
            }
        }

        let (catalog, duplicates) = build_catalog(&module_name, decoded);
        for name in &duplicates {
            emitter.warn(format!("Duplicate type name {}; keeping the first row", name));
        }

        emitter.progress(ScanProgress::new(total, total));
        let duration = started.elapsed();
        emitter.info(format!(
            "Decoded {} types from {} rows ({} row errors, {} duplicates) in {:?}",
            catalog.len(),
            total,
            row_errors.len(),
            duplicates.len(),
            duration
        ));
        emitter.state(ScanState::Completed);

        Ok(ScanOutcome::Completed(ScanReport {
            module,
            catalog: Arc::new(catalog),
            row_errors,
            duplicates,
            rows_total: total,
            duration,
        }))
    }
}

/// Resolve parent rows to names and insert in row order
fn build_catalog(module_name: &str, decoded: Vec<DecodedType>) -> (TypeCatalog, Vec<String>) {
    let names_by_row: HashMap<u32, String> = decoded
        .iter()
        .map(|d| (d.row_index, d.definition.full_name().to_string()))
        .collect();

    let mut builder = CatalogBuilder::with_capacity(module_name, decoded.len());
    let mut duplicates = Vec::new();
    for row in decoded {
        let parent = row.parent_row.and_then(|p| names_by_row.get(&p).cloned());
        if let Err(CatalogError::DuplicateTypeName(name)) =
            builder.insert(row.definition.with_parent(parent))
        {
            duplicates.push(name);
        }
    }
    (builder.finish(), duplicates)
}

fn cancelled(emitter: &Emitter<'_>, processed: u32) -> ScanOutcome {
    emitter.info(format!("Scan cancelled after {} rows", processed));
    emitter.state(ScanState::Cancelled);
    ScanOutcome::Cancelled
}

fn fail(emitter: &Emitter<'_>, error: ScanError) -> ScanError {
    emitter.error(error.to_string());
    emitter.state(ScanState::Failed);
    error
}
