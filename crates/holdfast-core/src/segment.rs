//! Log segment writer
//!
//! Appends length-prefixed encoded entries to the active log file and
//! rotates it once a size threshold is crossed.
//!
//! Write ordering per mutation:
//! 1. encode the entry and frame it with a u32 LE length prefix
//! 2. append the framed record with a single write
//! 3. caller updates the in-memory map only after the append returns Ok
//!
//! Rotation closes the active handle, renames the file to
//! `<path>_<unix-seconds>`, and reopens a fresh file at `<path>`. A failed
//! rotation leaves the writer without a usable file; every later append
//! fails, so the store stops accepting writes.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::error::{HoldfastError, HoldfastResult};
use crate::format::{encode_entry, LogEntry, LEN_PREFIX_SIZE};

/// Appends framed log entries to the active segment file.
///
/// `size` equals the sum of `4 + payload_len` for every record written to
/// the file since it was opened or last rotated. Callers serialize access
/// through the store's writer mutex.
pub struct SegmentWriter {
    /// Active file handle; None once closed or after a failed rotation
    file: Option<File>,
    /// Logical log path; rotation always recreates this file
    path: PathBuf,
    /// Current file size in bytes (tracked to avoid stat calls)
    size: u64,
    /// Rotate once `size` reaches this many bytes
    rotate_threshold: u64,
}

impl SegmentWriter {
    /// Open or create the log file at `path` in append mode.
    ///
    /// An existing file is resumed: `size` starts from its on-disk length
    /// so rotation accounting stays correct across restarts.
    pub fn open<P: AsRef<Path>>(path: P, rotate_threshold: u64) -> HoldfastResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, &e, "failed to open log file"))?;

        let size = file
            .metadata()
            .map_err(|e| io_err(&path, &e, "failed to stat log file"))?
            .len();

        Ok(Self {
            file: Some(file),
            path,
            size,
            rotate_threshold,
        })
    }

    /// Append one entry: u32 LE length prefix, then the encoded payload.
    ///
    /// Returns the byte offset in the current segment where the record
    /// starts. Prefix and payload go out as a single write so a record is
    /// never interleaved with another append.
    pub fn append(&mut self, entry: &LogEntry) -> HoldfastResult<u64> {
        let payload = encode_entry(entry)?;

        let file = self.file.as_mut().ok_or_else(|| unavailable(&self.path))?;

        let mut framed = Vec::with_capacity(LEN_PREFIX_SIZE + payload.len());
        framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        framed.extend_from_slice(&payload);

        file.write_all(&framed)
            .map_err(|e| io_err(&self.path, &e, "log append failed"))?;

        let offset = self.size;
        self.size += framed.len() as u64;
        Ok(offset)
    }

    /// Rotate if the active file has reached the threshold.
    ///
    /// Returns whether a rotation happened. On rotation the active handle
    /// is synced and closed, the file renamed to `<path>_<unix-seconds>`
    /// (with a numeric suffix if two rotations land in the same second),
    /// and a fresh file opened at `<path>` with `size` reset to 0.
    pub fn maybe_rotate(&mut self) -> HoldfastResult<bool> {
        if self.size < self.rotate_threshold {
            return Ok(false);
        }

        let rotated_bytes = self.size;

        // Sync and close before the rename; some platforms refuse to
        // rename a file with open handles.
        let file = self.file.take().ok_or_else(|| unavailable(&self.path))?;
        crate::durability::durable_sync(&file)
            .map_err(|e| io_err(&self.path, &e, "sync before rotation failed"))?;
        drop(file);

        // From here any failure leaves `self.file` as None: the writer is
        // poisoned and the store stops accepting writes.
        let rotated_path = self.rotated_path();
        std::fs::rename(&self.path, &rotated_path)
            .map_err(|e| io_err(&self.path, &e, "rename of full log segment failed"))?;

        let new_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, &e, "failed to open fresh log segment"))?;

        self.file = Some(new_file);
        self.size = 0;

        info!(
            rotated = %rotated_path.display(),
            bytes = rotated_bytes,
            "rotated log segment"
        );
        Ok(true)
    }

    /// Pick `<path>_<unix-seconds>`, disambiguating same-second rotations
    /// so a rename never clobbers an earlier rotated segment.
    fn rotated_path(&self) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut candidate = suffixed(&self.path, &format!("{}", secs));
        let mut attempt = 1u32;
        while candidate.exists() {
            candidate = suffixed(&self.path, &format!("{}_{}", secs, attempt));
            attempt += 1;
        }
        candidate
    }

    /// Force written bytes to stable storage.
    ///
    /// Sync only: nothing is re-encoded or re-appended. Quietly succeeds
    /// on a closed writer, which has nothing buffered.
    pub fn flush(&self) -> HoldfastResult<()> {
        match &self.file {
            Some(file) => crate::durability::durable_sync(file)
                .map_err(|e| io_err(&self.path, &e, "log sync failed")),
            None => Ok(()),
        }
    }

    /// Final flush, then close the active handle. Idempotent.
    pub fn close(&mut self) -> HoldfastResult<()> {
        if let Some(file) = self.file.take() {
            crate::durability::durable_sync(&file)
                .map_err(|e| io_err(&self.path, &e, "final sync on close failed"))?;
        }
        Ok(())
    }

    /// Whether the writer can accept appends.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Bytes appended to the active segment since open or last rotation.
    pub fn current_size(&self) -> u64 {
        self.size
    }

    /// Logical log path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Append `_suffix` to the full file name, keeping the parent directory.
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!("_{}", suffix));
    PathBuf::from(name)
}

fn io_err(path: &Path, err: &std::io::Error, what: &str) -> HoldfastError {
    HoldfastError::Io {
        path: Some(path.to_path_buf()),
        kind: err.kind(),
        message: format!("{}: {}", what, err),
    }
}

fn unavailable(path: &Path) -> HoldfastError {
    HoldfastError::Io {
        path: Some(path.to_path_buf()),
        kind: std::io::ErrorKind::Other,
        message: "log segment unavailable (closed or failed rotation)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Operation;
    use tempfile::TempDir;

    fn entry(key: &[u8], value: &[u8]) -> LogEntry {
        LogEntry::new(Operation::Insert, key.to_vec(), value.to_vec())
    }

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.bin");
        (dir, path)
    }

    #[test]
    fn test_append_returns_record_offsets() {
        let (_dir, path) = setup();
        let mut writer = SegmentWriter::open(&path, 1024 * 1024).unwrap();

        let first = entry(b"a", b"1");
        let second = entry(b"bb", b"22");

        assert_eq!(writer.append(&first).unwrap(), 0);
        assert_eq!(writer.append(&second).unwrap(), first.framed_len());
        assert_eq!(
            writer.current_size(),
            first.framed_len() + second.framed_len()
        );
    }

    #[test]
    fn test_size_matches_file_length() {
        let (_dir, path) = setup();
        let mut writer = SegmentWriter::open(&path, 1024 * 1024).unwrap();

        for i in 0..10 {
            writer.append(&entry(format!("key{}", i).as_bytes(), b"value")).unwrap();
        }
        writer.flush().unwrap();

        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert_eq!(writer.current_size(), on_disk);
    }

    #[test]
    fn test_reopen_resumes_size() {
        let (_dir, path) = setup();

        let expected = {
            let mut writer = SegmentWriter::open(&path, 1024 * 1024).unwrap();
            writer.append(&entry(b"k1", b"v1")).unwrap();
            writer.append(&entry(b"k2", b"v2")).unwrap();
            writer.close().unwrap();
            std::fs::metadata(&path).unwrap().len()
        };

        let writer = SegmentWriter::open(&path, 1024 * 1024).unwrap();
        assert_eq!(writer.current_size(), expected);
    }

    #[test]
    fn test_no_rotation_below_threshold() {
        let (_dir, path) = setup();
        let mut writer = SegmentWriter::open(&path, 1024 * 1024).unwrap();

        writer.append(&entry(b"small", b"record")).unwrap();
        assert!(!writer.maybe_rotate().unwrap());
        assert!(writer.current_size() > 0);
    }

    #[test]
    fn test_rotation_at_threshold() {
        let (dir, path) = setup();
        let mut writer = SegmentWriter::open(&path, 64).unwrap();

        let mut appended = 0u64;
        while appended < 64 {
            let e = entry(b"key", b"value");
            writer.append(&e).unwrap();
            appended += e.framed_len();
        }
        assert!(writer.maybe_rotate().unwrap());

        // Active segment starts over
        assert_eq!(writer.current_size(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        // Exactly one rotated file, carrying the pre-rotation bytes
        let rotated: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with("db.bin_"))
            })
            .collect();
        assert_eq!(rotated.len(), 1);
        assert_eq!(std::fs::metadata(&rotated[0]).unwrap().len(), appended);
    }

    #[test]
    fn test_two_rotations_keep_both_files() {
        let (dir, path) = setup();
        let mut writer = SegmentWriter::open(&path, 16).unwrap();

        for round in 0..2 {
            writer.append(&entry(b"key", format!("round{}", round).as_bytes())).unwrap();
            assert!(writer.maybe_rotate().unwrap());
        }

        let rotated_count = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map_or(false, |n| n.starts_with("db.bin_"))
            })
            .count();
        assert_eq!(rotated_count, 2);
    }

    #[test]
    fn test_append_after_close_fails() {
        let (_dir, path) = setup();
        let mut writer = SegmentWriter::open(&path, 1024).unwrap();

        writer.append(&entry(b"k", b"v")).unwrap();
        writer.close().unwrap();
        assert!(!writer.is_open());

        let result = writer.append(&entry(b"k2", b"v2"));
        assert!(matches!(result, Err(HoldfastError::Io { message, .. }) if message.contains("unavailable")));
    }

    #[test]
    fn test_close_idempotent() {
        let (_dir, path) = setup();
        let mut writer = SegmentWriter::open(&path, 1024).unwrap();

        writer.close().unwrap();
        writer.close().unwrap();
        writer.flush().unwrap(); // closed flush is a no-op
    }
}
