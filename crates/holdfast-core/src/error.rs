//! Error types for Holdfast operations
//!
//! All Holdfast errors are represented by the HoldfastError enum, which
//! carries enough context (path, offset, reason) to diagnose a failure
//! without re-reading the log.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Holdfast error types with detailed context
#[derive(Debug, Clone)]
pub enum HoldfastError {
    /// I/O operation failed (open, append, rename, sync, close)
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Lookup on a key that is not present in the store
    KeyNotFound,

    /// A fully-framed log record failed to decode during replay
    CorruptEntry {
        /// File containing the corrupt record
        path: PathBuf,
        /// Byte offset where the record starts
        offset: u64,
        /// Description of what failed to parse
        reason: String,
    },

    /// Key or value exceeds the maximum encodable size
    OversizedEntry {
        /// Size of the oversized component
        entry_size: u64,
        /// Maximum allowed size
        max_size: u64,
        /// Whether it's the key or value that's oversized
        component: String,
    },

    /// A mutation was attempted with an empty key
    EmptyKey,
}

impl fmt::Display for HoldfastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldfastError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            HoldfastError::KeyNotFound => {
                write!(f, "key not found")
            }

            HoldfastError::CorruptEntry { path, offset, reason } => {
                write!(f, "corrupt log entry in {} at offset {}: {}", path.display(), offset, reason)
            }

            HoldfastError::OversizedEntry { entry_size, max_size, component } => {
                write!(f, "entry {} too large: {} bytes exceeds limit of {} bytes",
                       component, entry_size, max_size)
            }

            HoldfastError::EmptyKey => {
                write!(f, "key must not be empty")
            }
        }
    }
}

impl Error for HoldfastError {}

/// Convert std::io::Error to HoldfastError::Io
impl From<io::Error> for HoldfastError {
    fn from(err: io::Error) -> Self {
        HoldfastError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for Holdfast operations
pub type HoldfastResult<T> = Result<T, HoldfastError>;
