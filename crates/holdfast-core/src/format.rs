//! Binary format definitions for Holdfast log entries
//!
//! Every record in the log is framed as:
//!   payload_length(u32 LE, 4 bytes) + payload(payload_length bytes)
//!
//! The payload is a self-describing encoded LogEntry:
//!   checksum(u32 LE) + operation(u8) + key_len(u16 LE) + value_len(u32 LE) + key + value
//!
//! The checksum is CRC32C over every payload byte after the checksum field,
//! so a fully-framed record whose bytes were damaged on disk is rejected
//! at decode time rather than silently applied.

use crate::error::{HoldfastError, HoldfastResult};

/// Size of the length prefix framing each record
pub const LEN_PREFIX_SIZE: usize = 4;

/// Fixed payload bytes before the key: checksum(4) + operation(1) + key_len(2) + value_len(4)
pub const PAYLOAD_HEADER_SIZE: usize = 11;

/// Maximum key size in bytes
pub const MAX_KEY_SIZE: usize = 1024;

/// Maximum value size in bytes (32MB)
pub const MAX_VALUE_SIZE: usize = 32 * 1024 * 1024;

/// Log operation types.
///
/// Tag 0 is deliberately unassigned so a zeroed byte never decodes
/// as a valid operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// First write of a key
    Insert = 1,
    /// Overwrite of an existing key with a different value
    Update = 2,
    /// Removal of a key
    Delete = 3,
}

impl Operation {
    /// Parse an operation from its on-disk tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Operation::Insert),
            2 => Some(Operation::Update),
            3 => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// A single durable mutation record.
///
/// Once appended to the log an entry is immutable; the log itself is
/// append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub operation: Operation,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl LogEntry {
    pub fn new(operation: Operation, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { operation, key, value }
    }

    /// Delete entries carry no value.
    pub fn delete(key: Vec<u8>) -> Self {
        Self { operation: Operation::Delete, key, value: Vec::new() }
    }

    /// Bytes this entry occupies in the log once framed: prefix + payload.
    pub fn framed_len(&self) -> u64 {
        (LEN_PREFIX_SIZE + PAYLOAD_HEADER_SIZE + self.key.len() + self.value.len()) as u64
    }
}

/// Encode a LogEntry into its payload bytes (length prefix not included).
///
/// Layout: checksum(u32 LE) + operation(u8) + key_len(u16 LE) + value_len(u32 LE) + key + value
pub fn encode_entry(entry: &LogEntry) -> HoldfastResult<Vec<u8>> {
    if entry.key.is_empty() {
        return Err(HoldfastError::EmptyKey);
    }

    if entry.key.len() > MAX_KEY_SIZE {
        return Err(HoldfastError::OversizedEntry {
            entry_size: entry.key.len() as u64,
            max_size: MAX_KEY_SIZE as u64,
            component: "key".to_string(),
        });
    }

    if entry.value.len() > MAX_VALUE_SIZE {
        return Err(HoldfastError::OversizedEntry {
            entry_size: entry.value.len() as u64,
            max_size: MAX_VALUE_SIZE as u64,
            component: "value".to_string(),
        });
    }

    let payload_size = PAYLOAD_HEADER_SIZE + entry.key.len() + entry.value.len();

    // Build the checksummed region first: operation + lengths + key + value
    let mut body = Vec::with_capacity(payload_size - 4);
    body.push(entry.operation as u8);
    body.extend_from_slice(&(entry.key.len() as u16).to_le_bytes());
    body.extend_from_slice(&(entry.value.len() as u32).to_le_bytes());
    body.extend_from_slice(&entry.key);
    body.extend_from_slice(&entry.value);

    let checksum = crc32c::crc32c(&body);

    let mut payload = Vec::with_capacity(payload_size);
    payload.extend_from_slice(&checksum.to_le_bytes());
    payload.extend_from_slice(&body);

    Ok(payload)
}

/// Decode a LogEntry from payload bytes.
///
/// Fails with `CorruptEntry` when the payload does not parse: too short,
/// checksum mismatch, unknown operation tag, or lengths inconsistent with
/// the payload size. Callers that know the record's file position rewrap
/// the error with the real path and offset.
pub fn decode_entry(payload: &[u8]) -> HoldfastResult<LogEntry> {
    if payload.len() < PAYLOAD_HEADER_SIZE {
        return Err(corrupt(format!(
            "payload too short: {} bytes, need at least {}",
            payload.len(),
            PAYLOAD_HEADER_SIZE
        )));
    }

    let stored_checksum = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let body = &payload[4..];

    let computed_checksum = crc32c::crc32c(body);
    if computed_checksum != stored_checksum {
        return Err(corrupt(format!(
            "checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
            stored_checksum, computed_checksum
        )));
    }

    let operation = match Operation::from_tag(body[0]) {
        Some(op) => op,
        None => return Err(corrupt(format!("unknown operation tag {}", body[0]))),
    };

    let key_len = u16::from_le_bytes([body[1], body[2]]) as usize;
    let value_len = u32::from_le_bytes([body[3], body[4], body[5], body[6]]) as usize;

    if key_len == 0 {
        return Err(corrupt("zero-length key".to_string()));
    }

    let data_start = 7; // after operation + key_len + value_len
    let expected_body_len = data_start + key_len + value_len;
    if body.len() != expected_body_len {
        return Err(corrupt(format!(
            "length fields inconsistent: key({}) + value({}) needs {} body bytes, have {}",
            key_len, value_len, expected_body_len, body.len()
        )));
    }

    let key_end = data_start + key_len;
    Ok(LogEntry {
        operation,
        key: body[data_start..key_end].to_vec(),
        value: body[key_end..].to_vec(),
    })
}

/// A CorruptEntry with placeholder position; replay rewrites path/offset.
fn corrupt(reason: String) -> HoldfastError {
    HoldfastError::CorruptEntry {
        path: std::path::PathBuf::from("<memory>"),
        offset: 0,
        reason,
    }
}
