//! Holdfast Core — Write-Ahead-Logged Key-Value Store
//!
//! A single-node key-value store where RAM is the read surface and an
//! append-only log makes every mutation durable before it is considered
//! committed.
//!
//! # Architecture
//!
//! - **Read path**: straight from the RAM hash table
//! - **Write path**: log-then-apply, append to the active segment before
//!   updating RAM
//! - **Rotation**: the active segment is renamed aside and restarted once
//!   it crosses a size threshold
//! - **Replay**: on open, the active log is scanned from offset 0 to
//!   rebuild the map, tolerating a torn record at the tail
//! - **Flusher**: a background thread periodically syncs the log file
//!   handle to stable storage
//!
//! # Single Writer, Concurrent Readers
//!
//! One mutex serializes every mutation, rotation, and flush; reads share
//! an RwLock on the map. Log order and map-state order therefore always
//! agree.

pub mod config;
pub mod durability;
pub mod error;
pub mod flusher;
pub mod format;
pub mod replay;
pub mod segment;
pub mod store;

// Re-export key types for convenience
pub use config::Config;
pub use error::{HoldfastError, HoldfastResult};
pub use flusher::{start_flusher, FlushHandle, FlushStats};
pub use format::{LogEntry, Operation};
pub use replay::{replay, ReplaySummary};
pub use segment::SegmentWriter;
pub use store::HoldfastStore;
