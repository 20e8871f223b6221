//! Error types for exewrap.
//!
//! Library operations return [`ExeError`]. Addresses that have no
//! representation in a coordinate system are not errors; conversions return
//! `Option` for those.

use thiserror::Error;

use crate::formats::pe::PeError;
use crate::io::error::IoError;

/// Main error type for executable operations.
#[derive(Debug, Error)]
pub enum ExeError {
    /// Wrapper id (or path) does not resolve
    #[error("No such wrapper: {0}")]
    NoSuchWrapper(String),

    /// Child index past the current entry count
    #[error("No such entry: index {index} (node holds {count})")]
    NoSuchEntry { index: usize, count: usize },

    /// Wrapper has no child entries
    #[error("Wrapper stores no entries")]
    NotANode,

    #[error("No space to add entry: {used:#x} used + {entry_size:#x} exceeds capacity {capacity:#x}")]
    CapacityExceeded {
        used: u64,
        entry_size: u64,
        capacity: u64,
    },

    #[error("Range {offset:#x}+{size:#x} is outside the image ({len:#x} bytes)")]
    OutOfBounds { offset: u64, size: u64, len: u64 },

    #[error("Entry template is {actual} bytes, node expects {expected}")]
    TemplateMismatch { expected: u64, actual: u64 },

    /// Null-terminated list is empty, nothing to base a new entry on
    #[error("No template entry available for an empty list")]
    NoTemplate,

    /// Content after a mutation no longer parses; the mutation was undone
    #[error("Re-wrap rejected the new content: {0}")]
    RewrapRejected(String),

    /// Re-wrap did not observe the added entry; the mutation was undone
    #[error("Added entry was not registered by the re-wrap")]
    EntryNotRegistered,

    #[error("Entry count field would overflow")]
    CountOverflow,

    #[error("Executable is not mapped")]
    NotMapped,

    /// Malformed content for a format without its own error type
    #[error("Invalid binary format: {0}")]
    InvalidFormat(String),

    #[error("PE format error: {0}")]
    Format(#[from] PeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Limit(#[from] IoError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ExeError {
    fn from(err: serde_json::Error) -> Self {
        ExeError::Config(err.to_string())
    }
}

/// Result type alias for executable operations
pub type Result<T> = std::result::Result<T, ExeError>;
