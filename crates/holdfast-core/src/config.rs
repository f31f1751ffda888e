//! Configuration for a Holdfast store
//!
//! A plain struct with workable defaults; embedding processes construct
//! it directly and may call `validate()` before opening a store.

use std::time::Duration;

/// Store configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Active log file rotation threshold (bytes)
    pub rotate_threshold_bytes: u64,
    /// Background flusher cadence between durable syncs
    pub flush_cadence: Duration,
    /// Whether `open` starts the background flusher
    pub start_flusher: bool,
}

impl Config {
    /// Config with the given rotation threshold and default flush behavior.
    pub fn with_rotate_threshold(bytes: u64) -> Self {
        Self {
            rotate_threshold_bytes: bytes,
            ..Self::default()
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.rotate_threshold_bytes == 0 {
            return Err("rotate_threshold_bytes must be > 0".into());
        }
        if self.flush_cadence.as_millis() == 0 {
            return Err("flush_cadence must be > 0".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rotate_threshold_bytes: 64 * 1024 * 1024,
            flush_cadence: Duration::from_secs(5),
            start_flusher: true,
        }
    }
}
