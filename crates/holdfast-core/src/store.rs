//! The Holdfast store — an in-memory map backed by a write-ahead log.
//!
//! **Read path**: straight from the RAM hash table behind a RwLock.
//! **Write path**: log-then-apply. A mutation is encoded, appended to the
//! active log segment, and only then installed in the map. If the append
//! fails the map is untouched and the caller knows the write never became
//! durable.
//!
//! One writer mutex is held across the entire mutation (the no-op check,
//! the append, the rotation check, and the map install) so on-disk log
//! order and the sequence of map states always agree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::config::Config;
use crate::error::{HoldfastError, HoldfastResult};
use crate::flusher::{start_flusher, FlushHandle, FlushStats};
use crate::format::{LogEntry, Operation};
use crate::replay::replay;
use crate::segment::SegmentWriter;

/// Write-ahead-logged key-value store.
///
/// All public methods take `&self`. Readers share the map's RwLock;
/// writers serialize through the segment writer's mutex, which they hold
/// for the whole mutation. The background flusher takes the same mutex to
/// sync the file handle on a cadence.
pub struct HoldfastStore {
    /// The authoritative in-memory mapping
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    /// Active log segment — the writer-side critical section
    wal: Arc<Mutex<SegmentWriter>>,
    /// Background flusher handle (None when not running)
    flusher: Mutex<Option<FlushHandle>>,
    /// Flusher counters, shared with the flusher thread
    flush_stats: Arc<FlushStats>,
    /// Logical log path
    path: PathBuf,
    /// Store configuration
    config: Config,
}

impl HoldfastStore {
    /// Open a store with the given rotation threshold and default config.
    pub fn open<P: AsRef<Path>>(path: P, rotate_threshold_bytes: u64) -> HoldfastResult<Self> {
        Self::open_with_config(path, Config::with_rotate_threshold(rotate_threshold_bytes))
    }

    /// Open a store: replay the active log into memory, open the segment
    /// writer, and start the background flusher if configured.
    ///
    /// The map reflects the full log before this returns; callers can
    /// serve reads and writes immediately.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> HoldfastResult<Self> {
        let path = path.as_ref().to_path_buf();

        config.validate().map_err(|reason| HoldfastError::Io {
            path: Some(path.clone()),
            kind: std::io::ErrorKind::InvalidInput,
            message: reason,
        })?;

        let mut data = HashMap::new();
        let summary = replay(&path, &mut data)?;
        if summary.entries_applied > 0 {
            info!(
                path = %path.display(),
                entries = summary.entries_applied,
                keys = data.len(),
                "store recovered from log"
            );
        }

        let writer = SegmentWriter::open(&path, config.rotate_threshold_bytes)?;

        let store = Self {
            data: RwLock::new(data),
            wal: Arc::new(Mutex::new(writer)),
            flusher: Mutex::new(None),
            flush_stats: Arc::new(FlushStats::new()),
            path,
            config,
        };

        if store.config.start_flusher {
            store.start_flusher()?;
        }

        Ok(store)
    }

    /// Start the background flusher. Replaces a previous handle, which
    /// shuts its thread down.
    pub fn start_flusher(&self) -> HoldfastResult<()> {
        let handle = start_flusher(
            Arc::clone(&self.wal),
            Arc::clone(&self.flush_stats),
            self.config.flush_cadence,
        )?;
        let mut flusher = self.flusher.lock();
        *flusher = Some(handle);
        Ok(())
    }

    /// Stop the background flusher. Its shutdown performs a final flush.
    pub fn stop_flusher(&self) {
        let mut flusher = self.flusher.lock();
        if let Some(handle) = flusher.take() {
            handle.shutdown();
        }
    }

    /// Set `key` to `value`.
    ///
    /// Compares against the stored value with exact byte equality:
    /// an absent key logs an Insert, a different value logs an Update, and
    /// an identical value is a no-op that touches neither log nor map.
    /// The entry is appended (and the segment possibly rotated) before the
    /// map changes.
    pub fn set(&self, key: &[u8], value: &[u8]) -> HoldfastResult<()> {
        let mut wal = self.wal.lock();

        let operation = {
            let data = self.data.read();
            match data.get(key) {
                Some(current) if current.as_slice() == value => return Ok(()),
                Some(_) => Operation::Update,
                None => Operation::Insert,
            }
        };

        let entry = LogEntry::new(operation, key.to_vec(), value.to_vec());
        wal.append(&entry)?;

        {
            let mut data = self.data.write();
            data.insert(key.to_vec(), value.to_vec());
        }

        wal.maybe_rotate()?;
        Ok(())
    }

    /// Look up `key` in memory. Never touches the log.
    pub fn get(&self, key: &[u8]) -> HoldfastResult<Vec<u8>> {
        let data = self.data.read();
        data.get(key).cloned().ok_or(HoldfastError::KeyNotFound)
    }

    /// Delete `key`, logging a Delete entry under the same lock discipline
    /// as `set` so the removal survives replay. Deleting an absent key is
    /// a no-op.
    pub fn delete(&self, key: &[u8]) -> HoldfastResult<()> {
        let mut wal = self.wal.lock();

        {
            let data = self.data.read();
            if !data.contains_key(key) {
                return Ok(());
            }
        }

        let entry = LogEntry::delete(key.to_vec());
        wal.append(&entry)?;

        {
            let mut data = self.data.write();
            data.remove(key);
        }

        wal.maybe_rotate()?;
        Ok(())
    }

    /// Force buffered log writes to stable storage now.
    pub fn flush(&self) -> HoldfastResult<()> {
        let wal = self.wal.lock();
        wal.flush()
    }

    /// Stop the flusher, flush, and close the active log file.
    ///
    /// Mutations after close fail with an I/O error. Idempotent.
    pub fn close(&self) -> HoldfastResult<()> {
        self.stop_flusher();
        let mut wal = self.wal.lock();
        wal.close()
    }

    /// Whether `key` is present in memory.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        let data = self.data.read();
        data.contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let data = self.data.read();
        data.len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        let data = self.data.read();
        data.is_empty()
    }

    /// Logical log path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flusher counters.
    pub fn flush_stats(&self) -> &FlushStats {
        &self.flush_stats
    }
}

impl Drop for HoldfastStore {
    fn drop(&mut self) {
        self.stop_flusher();
        let mut wal = self.wal.lock();
        let _ = wal.close();
    }
}
