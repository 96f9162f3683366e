//! Model Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::FileRef;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A model error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A metadata document or directory could not be read or written.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A metadata document is not valid JSON for the expected schema.
    #[display("malformed metadata document: {}", _0.display())]
    Malformed(#[error(not(source))] PathBuf),
    /// A metadata document parsed but breaks an invariant (empty digest,
    /// empty filename, duplicate names).
    #[display("invalid metadata in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    /// A patch or action names a file that does not exist in the snapshot.
    #[display("metadata inconsistent: {_0} no longer exists")]
    MetadataInconsistent(#[error(not(source))] FileRef),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
