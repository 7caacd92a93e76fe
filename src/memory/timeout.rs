//! Timeout decorator for memory sources
//!
//! Reads go through a shared queue served by a small pool of worker threads,
//! and the caller waits at most `timeout` for the answer. A read that misses
//! the deadline leaves its worker stuck; a replacement is started at once so
//! the pool keeps serving other callers, and the stuck worker retires when its
//! read finally returns.

use super::source::{MemoryRegion, MemorySource};
use crate::core::types::{MemoryError, MemoryResult};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct ReadRequest {
    region: MemoryRegion,
    reply: mpsc::SyncSender<MemoryResult<Vec<u8>>>,
}

/// State shared by the pool's workers
struct Pool {
    inner: Arc<dyn MemorySource>,
    requests: Mutex<mpsc::Receiver<ReadRequest>>,
    /// Workers currently alive, stuck ones included
    live: AtomicUsize,
    /// Pool size to return to once stuck workers retire
    target: usize,
    timeout: Duration,
    spawned: AtomicU64,
}

impl Pool {
    fn spawn_worker(self: &Arc<Self>) -> MemoryResult<()> {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::clone(self);
        self.live.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("typescope-read-{}", id))
            .spawn(move || pool.serve());
        if let Err(e) = spawned {
            self.live.fetch_sub(1, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    fn serve(&self) {
        loop {
            let request = match self.requests.lock() {
                Ok(requests) => requests.recv(),
                Err(_) => break,
            };
            let Ok(request) = request else { break };

            let started = Instant::now();
            let result = self.inner.read(request.region);
            // The caller may have timed out and dropped the receiver
            let _ = request.reply.send(result);

            if started.elapsed() >= self.timeout && self.retire_if_surplus() {
                return;
            }
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Leave the pool when a replacement was started for this worker's read
    fn retire_if_surplus(&self) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live > self.target).then(|| live - 1)
            })
            .is_ok()
    }
}

/// Memory source whose reads give up after a fixed timeout
pub struct TimeoutSource {
    pool: Arc<Pool>,
    requests: Mutex<mpsc::Sender<ReadRequest>>,
    timeout: Duration,
}

impl TimeoutSource {
    /// Wraps `inner` with a single read worker
    pub fn new(inner: Arc<dyn MemorySource>, timeout: Duration) -> MemoryResult<Self> {
        Self::with_workers(inner, timeout, 1)
    }

    /// Wraps `inner`; spawns `workers` read threads immediately
    pub fn with_workers(
        inner: Arc<dyn MemorySource>,
        timeout: Duration,
        workers: usize,
    ) -> MemoryResult<Self> {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<ReadRequest>();
        let pool = Arc::new(Pool {
            inner,
            requests: Mutex::new(rx),
            live: AtomicUsize::new(0),
            target: workers,
            timeout,
            spawned: AtomicU64::new(0),
        });
        for _ in 0..workers {
            pool.spawn_worker()?;
        }
        Ok(TimeoutSource {
            pool,
            requests: Mutex::new(tx),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Workers alive right now, including any stuck on a read
    pub fn live_workers(&self) -> usize {
        self.pool.live.load(Ordering::SeqCst)
    }

    fn replace_stuck_worker(&self) -> MemoryResult<()> {
        self.pool.spawn_worker()?;
        debug!(
            "Started replacement read worker; {} alive",
            self.live_workers()
        );
        Ok(())
    }
}

impl MemorySource for TimeoutSource {
    fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let sent = self
            .requests
            .lock()
            .map_err(|_| MemoryError::InvalidHandle("read queue lock poisoned".to_string()))?
            .send(ReadRequest {
                region,
                reply: reply_tx,
            });
        if sent.is_err() {
            return Err(MemoryError::InvalidHandle(
                "read workers have shut down".to_string(),
            ));
        }

        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Read of {} timed out after {} ms; abandoning its worker",
                    region,
                    self.timeout.as_millis()
                );
                self.replace_stuck_worker()?;
                Err(MemoryError::Timeout {
                    address: region.address,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.replace_stuck_worker()?;
                Err(MemoryError::InvalidHandle(
                    "read worker exited unexpectedly".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Address;
    use crate::memory::BufferSource;
    use std::sync::atomic::AtomicBool;

    /// Blocks the first read for a long time, answers the rest immediately
    struct StuckOnce {
        inner: BufferSource,
        stuck: AtomicBool,
    }

    impl MemorySource for StuckOnce {
        fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
            if self.stuck.swap(false, Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(500));
            }
            self.inner.read(region)
        }
    }

    #[test]
    fn test_fast_reads_pass_through() {
        let inner: Arc<dyn MemorySource> =
            Arc::new(BufferSource::with_segment(Address::new(0x10), vec![7; 8]));
        let source = TimeoutSource::new(inner, Duration::from_secs(5)).unwrap();
        let bytes = source
            .read(MemoryRegion::new(Address::new(0x10), 4))
            .unwrap();
        assert_eq!(bytes, vec![7; 4]);

        // Errors from the inner source are forwarded unchanged
        assert!(matches!(
            source.read(MemoryRegion::new(Address::new(0x100), 4)),
            Err(MemoryError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_stuck_read_times_out_and_worker_recovers() {
        let inner: Arc<dyn MemorySource> = Arc::new(StuckOnce {
            inner: BufferSource::with_segment(Address::new(0x10), vec![1; 8]),
            stuck: AtomicBool::new(true),
        });
        let source = TimeoutSource::new(inner, Duration::from_millis(50)).unwrap();
        let region = MemoryRegion::new(Address::new(0x10), 4);

        assert!(matches!(
            source.read(region),
            Err(MemoryError::Timeout { timeout_ms: 50, .. })
        ));

        // A fresh worker serves the next read without waiting for the stuck one
        assert_eq!(source.read(region).unwrap(), vec![1; 4]);
    }

    /// Stalls reads at one address, answers everything else immediately
    struct StallAt {
        inner: BufferSource,
        stall_at: Address,
        stall: Duration,
    }

    impl MemorySource for StallAt {
        fn read(&self, region: MemoryRegion) -> MemoryResult<Vec<u8>> {
            if region.address == self.stall_at {
                thread::sleep(self.stall);
            }
            self.inner.read(region)
        }
    }

    #[test]
    fn test_slow_read_does_not_block_other_workers() {
        let inner: Arc<dyn MemorySource> = Arc::new(StallAt {
            inner: BufferSource::with_segment(Address::new(0x10), vec![3; 64]),
            stall_at: Address::new(0x10),
            stall: Duration::from_millis(600),
        });
        let source =
            Arc::new(TimeoutSource::with_workers(inner, Duration::from_secs(5), 2).unwrap());

        let slow = {
            let source = Arc::clone(&source);
            thread::spawn(move || source.read(MemoryRegion::new(Address::new(0x10), 4)))
        };
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let fast = source.read(MemoryRegion::new(Address::new(0x20), 4)).unwrap();
        assert_eq!(fast, vec![3; 4]);
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(slow.join().unwrap().unwrap(), vec![3; 4]);
    }

    #[test]
    fn test_stuck_worker_retires_after_replacement() {
        let inner: Arc<dyn MemorySource> = Arc::new(StallAt {
            inner: BufferSource::with_segment(Address::new(0x10), vec![5; 16]),
            stall_at: Address::new(0x10),
            stall: Duration::from_millis(200),
        });
        let source = TimeoutSource::with_workers(inner, Duration::from_millis(20), 1).unwrap();
        assert!(source.read(MemoryRegion::new(Address::new(0x10), 4)).is_err());
        assert_eq!(source.live_workers(), 2);

        // Once the stuck read returns and is answered, the surplus worker leaves
        thread::sleep(Duration::from_millis(500));
        assert_eq!(source.live_workers(), 1);
        assert_eq!(
            source.read(MemoryRegion::new(Address::new(0x14), 4)).unwrap(),
            vec![5; 4]
        );
    }
}
