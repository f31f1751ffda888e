//! Background flusher
//!
//! A periodic task that makes buffered log writes durable. Each cycle it
//! takes the same writer mutex that serializes mutations and calls
//! `SegmentWriter::flush()`: a sync of the file handle and nothing more.
//! Entries already appended by `set`/`delete` are never re-encoded or
//! re-appended.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{HoldfastError, HoldfastResult};
use crate::segment::SegmentWriter;

/// How often the sleeping flusher checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Counters published by the flusher thread.
pub struct FlushStats {
    /// Durable syncs completed
    sync_cycles: AtomicU64,
    /// Syncs that failed (the cycle retries on the next tick)
    sync_errors: AtomicU64,
}

impl FlushStats {
    pub fn new() -> Self {
        Self {
            sync_cycles: AtomicU64::new(0),
            sync_errors: AtomicU64::new(0),
        }
    }

    /// Durable syncs completed since the store opened.
    pub fn sync_cycles(&self) -> u64 {
        self.sync_cycles.load(Ordering::Relaxed)
    }

    /// Failed sync attempts since the store opened.
    pub fn sync_errors(&self) -> u64 {
        self.sync_errors.load(Ordering::Relaxed)
    }

    fn record_sync(&self) {
        self.sync_cycles.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.sync_errors.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for FlushStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the running flusher thread.
/// Dropping the handle signals the thread to stop and waits for it.
pub struct FlushHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FlushHandle {
    /// Request shutdown and wait for the thread's final flush to finish.
    pub fn shutdown(mut self) {
        self.signal_and_join();
    }

    /// Whether the flusher thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn signal_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FlushHandle {
    fn drop(&mut self) {
        self.signal_and_join();
    }
}

/// Spawn the flusher thread.
///
/// The thread sleeps for `cadence` between cycles, waking early on
/// shutdown. Shutdown always performs one final flush so close never
/// drops buffered bytes.
pub fn start_flusher(
    wal: Arc<Mutex<SegmentWriter>>,
    stats: Arc<FlushStats>,
    cadence: Duration,
) -> HoldfastResult<FlushHandle> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let thread = thread::Builder::new()
        .name("holdfast-flush".to_string())
        .spawn(move || {
            flush_loop(wal, stats, cadence, shutdown_flag);
        })
        .map_err(|e| HoldfastError::Io {
            path: None,
            kind: std::io::ErrorKind::Other,
            message: format!("failed to spawn flusher thread: {}", e),
        })?;

    Ok(FlushHandle {
        shutdown,
        thread: Some(thread),
    })
}

fn flush_loop(
    wal: Arc<Mutex<SegmentWriter>>,
    stats: Arc<FlushStats>,
    cadence: Duration,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        let wake_time = Instant::now() + cadence;
        while Instant::now() < wake_time {
            if shutdown.load(Ordering::Acquire) {
                sync_once(&wal, &stats);
                return;
            }
            thread::sleep(SHUTDOWN_POLL.min(cadence));
        }

        if shutdown.load(Ordering::Acquire) {
            sync_once(&wal, &stats);
            return;
        }

        sync_once(&wal, &stats);
    }
}

/// One flush cycle: lock the writer, sync the file handle.
fn sync_once(wal: &Mutex<SegmentWriter>, stats: &FlushStats) {
    let writer = wal.lock();
    match writer.flush() {
        Ok(()) => {
            stats.record_sync();
            debug!(bytes = writer.current_size(), "flushed log segment");
        }
        Err(e) => {
            stats.record_error();
            error!(error = %e, "log flush failed");
        }
    }
}
