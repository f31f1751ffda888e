//! Startup log replay
//!
//! Walks the active log file from offset 0, applying each framed record to
//! the target map in log order. Later records for a key override earlier
//! ones, so the map converges to the same state the original mutation
//! sequence produced.
//!
//! Two failure shapes are kept apart on purpose:
//! - a record cut off by end-of-file (partial length prefix or partial
//!   payload) is a torn write from a crash mid-append, so replay stops
//!   cleanly at the last complete record
//! - a fully-framed payload that fails to decode is corruption, and replay
//!   aborts with `CorruptEntry` so startup fails loudly instead of
//!   silently dropping data

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use hashbrown::HashMap;
use tracing::{info, warn};

use crate::error::{HoldfastError, HoldfastResult};
use crate::format::{decode_entry, Operation, LEN_PREFIX_SIZE};

/// What a replay pass saw.
#[derive(Debug, Clone, Copy)]
pub struct ReplaySummary {
    /// Complete records decoded and applied
    pub entries_applied: u64,
    /// Bytes consumed as complete records (the torn tail, if any, excluded)
    pub bytes_scanned: u64,
    /// Whether the file ended mid-record
    pub torn_tail: bool,
}

/// Replay the log at `path` into `map`.
///
/// A missing file is an empty log: a store opening for the first time has
/// nothing to replay. Entries already in `map` are overridden record by
/// record, so replaying the same well-formed log twice yields the same map.
pub fn replay(path: &Path, map: &mut HashMap<Vec<u8>, Vec<u8>>) -> HoldfastResult<ReplaySummary> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no log file yet, starting empty");
            return Ok(ReplaySummary {
                entries_applied: 0,
                bytes_scanned: 0,
                torn_tail: false,
            });
        }
        Err(e) => {
            return Err(HoldfastError::Io {
                path: Some(path.to_path_buf()),
                kind: e.kind(),
                message: format!("failed to open log for replay: {}", e),
            })
        }
    };

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer).map_err(|e| HoldfastError::Io {
        path: Some(path.to_path_buf()),
        kind: e.kind(),
        message: format!("failed to read log for replay: {}", e),
    })?;

    let mut offset = 0usize;
    let mut applied = 0u64;
    let mut torn_tail = false;

    while offset < buffer.len() {
        if offset + LEN_PREFIX_SIZE > buffer.len() {
            // Partial length prefix at EOF: crash point, not corruption
            torn_tail = true;
            break;
        }

        let payload_len = u32::from_le_bytes([
            buffer[offset],
            buffer[offset + 1],
            buffer[offset + 2],
            buffer[offset + 3],
        ]) as usize;

        let payload_start = offset + LEN_PREFIX_SIZE;
        if payload_start + payload_len > buffer.len() {
            // Partial payload at EOF: same crash point
            torn_tail = true;
            break;
        }

        let payload = &buffer[payload_start..payload_start + payload_len];
        let entry = match decode_entry(payload) {
            Ok(entry) => entry,
            Err(HoldfastError::CorruptEntry { reason, .. }) => {
                // Rewrap with the real file position; map keeps the records
                // applied before this one
                return Err(HoldfastError::CorruptEntry {
                    path: path.to_path_buf(),
                    offset: offset as u64,
                    reason,
                });
            }
            Err(other) => return Err(other),
        };

        match entry.operation {
            Operation::Insert | Operation::Update => {
                map.insert(entry.key, entry.value);
            }
            Operation::Delete => {
                map.remove(&entry.key);
            }
        }

        applied += 1;
        offset = payload_start + payload_len;
    }

    if torn_tail {
        warn!(
            path = %path.display(),
            offset,
            trailing_bytes = buffer.len() - offset,
            "torn record at end of log, stopping replay at last complete record"
        );
    }

    info!(
        path = %path.display(),
        entries = applied,
        bytes = offset,
        "replayed write-ahead log"
    );

    Ok(ReplaySummary {
        entries_applied: applied,
        bytes_scanned: offset as u64,
        torn_tail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{encode_entry, LogEntry};
    use crate::segment::SegmentWriter;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.bin");
        (dir, path)
    }

    fn write_log(path: &Path, entries: &[LogEntry]) {
        let mut writer = SegmentWriter::open(path, u64::MAX).unwrap();
        for entry in entries {
            writer.append(entry).unwrap();
        }
        writer.close().unwrap();
    }

    fn put(key: &[u8], value: &[u8]) -> LogEntry {
        LogEntry::new(Operation::Insert, key.to_vec(), value.to_vec())
    }

    #[test]
    fn test_replay_missing_file_is_empty_log() {
        let (_dir, path) = setup();
        let mut map = HashMap::new();

        let summary = replay(&path, &mut map).unwrap();
        assert_eq!(summary.entries_applied, 0);
        assert!(!summary.torn_tail);
        assert!(map.is_empty());
    }

    #[test]
    fn test_replay_applies_in_log_order() {
        let (_dir, path) = setup();
        write_log(
            &path,
            &[
                put(b"k", b"first"),
                LogEntry::new(Operation::Update, b"k".to_vec(), b"second".to_vec()),
            ],
        );

        let mut map = HashMap::new();
        let summary = replay(&path, &mut map).unwrap();

        assert_eq!(summary.entries_applied, 2);
        assert_eq!(map.get(b"k".as_slice()), Some(&b"second".to_vec()));
    }

    #[test]
    fn test_replay_honors_delete() {
        let (_dir, path) = setup();
        write_log(
            &path,
            &[
                put(b"keep", b"1"),
                put(b"drop", b"2"),
                LogEntry::delete(b"drop".to_vec()),
            ],
        );

        let mut map = HashMap::new();
        replay(&path, &mut map).unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.contains_key(b"keep".as_slice()));
        assert!(!map.contains_key(b"drop".as_slice()));
    }

    #[test]
    fn test_replay_idempotent() {
        let (_dir, path) = setup();
        write_log(
            &path,
            &[put(b"a", b"1"), put(b"b", b"2"), LogEntry::delete(b"a".to_vec())],
        );

        let mut first = HashMap::new();
        let mut second = HashMap::new();
        replay(&path, &mut first).unwrap();
        replay(&path, &mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_truncated_tail_tolerated() {
        let (_dir, path) = setup();
        write_log(&path, &[put(b"a", b"1"), put(b"b", b"2")]);

        let clean_map = {
            let mut map = HashMap::new();
            replay(&path, &mut map).unwrap();
            map
        };

        // 1 to 3 stray bytes after the last complete record
        for stray in 1..=3usize {
            let (_d, tail_path) = setup();
            let mut data = std::fs::read(&path).unwrap();
            data.extend(std::iter::repeat(0xAB).take(stray));
            std::fs::write(&tail_path, &data).unwrap();

            let mut map = HashMap::new();
            let summary = replay(&tail_path, &mut map).unwrap();

            assert!(summary.torn_tail);
            assert_eq!(summary.entries_applied, 2);
            assert_eq!(map, clean_map);
        }
    }

    #[test]
    fn test_torn_payload_tolerated() {
        let (_dir, path) = setup();
        write_log(&path, &[put(b"complete", b"record")]);

        // A full length prefix promising 64 bytes, then only 5 of them
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&64u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3, 4, 5]);
        std::fs::write(&path, &data).unwrap();

        let mut map = HashMap::new();
        let summary = replay(&path, &mut map).unwrap();

        assert!(summary.torn_tail);
        assert_eq!(summary.entries_applied, 1);
        assert_eq!(map.get(b"complete".as_slice()), Some(&b"record".to_vec()));
    }

    #[test]
    fn test_corrupt_payload_aborts_replay() {
        let (_dir, path) = setup();

        let first = put(b"good", b"value");
        let second = put(b"bad", b"value");
        write_log(&path, &[first.clone(), second]);

        // Damage a byte inside the second record's payload; its length
        // prefix stays intact, so this is corruption rather than a torn tail
        let mut data = std::fs::read(&path).unwrap();
        let second_payload_start = first.framed_len() as usize + LEN_PREFIX_SIZE;
        data[second_payload_start + 8] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        let mut map = HashMap::new();
        let result = replay(&path, &mut map);

        match result {
            Err(HoldfastError::CorruptEntry { offset, .. }) => {
                assert_eq!(offset, first.framed_len());
            }
            other => panic!("expected CorruptEntry, got {:?}", other),
        }

        // Records before the corrupt one stay applied (documented partial state)
        assert_eq!(map.get(b"good".as_slice()), Some(&b"value".to_vec()));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_corrupt_error_carries_file_position() {
        let (_dir, path) = setup();

        // Hand-frame a record whose payload is garbage of a plausible size
        let good = encode_entry(&put(b"k", b"v")).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&(good.len() as u32).to_le_bytes());
        data.extend_from_slice(&good);
        let garbage = vec![0u8; 20];
        data.extend_from_slice(&(garbage.len() as u32).to_le_bytes());
        data.extend_from_slice(&garbage);
        std::fs::write(&path, &data).unwrap();

        let mut map = HashMap::new();
        match replay(&path, &mut map) {
            Err(HoldfastError::CorruptEntry { path: err_path, offset, .. }) => {
                assert_eq!(err_path, path);
                assert_eq!(offset, (LEN_PREFIX_SIZE + good.len()) as u64);
            }
            other => panic!("expected CorruptEntry, got {:?}", other),
        }
    }
}
