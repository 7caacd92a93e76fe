//! Scan events, event sinks and cancellation
//!
//! A scan never blocks on its observers. Events are pushed into an
//! `EventSink` owned by the caller, in emission order; sinks whose receiver
//! has gone away drop events silently.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fraction of type rows processed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanProgress {
    pub processed: u32,
    pub total: u32,
    /// 0.0 to 1.0; exactly 1.0 only on the completion event
    pub fraction: f64,
}

impl ScanProgress {
    pub fn new(processed: u32, total: u32) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            f64::from(processed) / f64::from(total)
        };
        ScanProgress {
            processed,
            total,
            fraction,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

impl fmt::Display for ScanProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}%)",
            self.processed,
            self.total,
            self.fraction * 100.0
        )
    }
}

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a single scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Idle,
    Locating,
    Decoding,
    Completed,
    Failed,
    Cancelled,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::Completed | ScanState::Failed | ScanState::Cancelled
        )
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Locating => "locating",
            ScanState::Decoding => "decoding",
            ScanState::Completed => "completed",
            ScanState::Failed => "failed",
            ScanState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Something a scan reports to its observer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ScanEvent {
    Progress(ScanProgress),
    Log { level: LogLevel, message: String },
    State(ScanState),
}

impl ScanEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        ScanEvent::Log {
            level,
            message: message.into(),
        }
    }
}

/// Receiver side of scan events, owned by the embedding layer.
///
/// `emit` must not block for long; the scan thread calls it inline.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for std::sync::mpsc::Sender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        let _ = self.send(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: ScanEvent) {
        (**self).emit(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: ScanEvent) {
        (**self).emit(event)
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Event emitter for one scan; mirrors log events to tracing
pub(crate) struct Emitter<'a> {
    sink: &'a dyn EventSink,
    module: &'a str,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(sink: &'a dyn EventSink, module: &'a str) -> Self {
        Emitter { sink, module }
    }

    pub(crate) fn progress(&self, progress: ScanProgress) {
        self.sink.emit(ScanEvent::Progress(progress));
    }

    pub(crate) fn state(&self, state: ScanState) {
        debug!("[{}] scan {}", self.module, state);
        self.sink.emit(ScanEvent::State(state));
    }

    pub(crate) fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => debug!("[{}] {}", self.module, message),
            LogLevel::Info => info!("[{}] {}", self.module, message),
            LogLevel::Warn => warn!("[{}] {}", self.module, message),
            LogLevel::Error => error!("[{}] {}", self.module, message),
        }
        self.sink.emit(ScanEvent::log(level, message));
    }

    pub(crate) fn info(&self, message: String) {
        self.log(LogLevel::Info, message)
    }

    pub(crate) fn warn(&self, message: String) {
        self.log(LogLevel::Warn, message)
    }

    pub(crate) fn error(&self, message: String) {
        self.log(LogLevel::Error, message)
    }
}

/// Cooperative cancellation flag shared between a scan and its caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the scan stops before its next row
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
