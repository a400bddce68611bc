//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The directory holding the database could not be created.
    #[display("cannot prepare cache location: {}", _0.display())]
    Location(#[error(not(source))] PathBuf),
    /// A stored row could not be converted back into an entry.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// Payload could not be compressed for storage or decompressed on read.
    #[display("cache compression error")]
    Compression,
    /// A write was larger than the per-entry limit and was not stored.
    #[display("entry of {size} bytes exceeds the maximum entry size of {maximum} bytes")]
    EntryTooLarge { size: u64, maximum: u64 },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A busy database may well accept the same write a moment later.
        matches!(self, Self::Database)
    }
}
