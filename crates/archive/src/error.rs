//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Errors here rarely escape the crate. The executor turns them into per-action
//! [`Outcome`](crate::execute::Outcome)s and the reconciler turns them into an
//! incomplete report; only planning helpers return them directly.

use derive_more::{Display, Error};
use mcarch_model::FileRef;
use mcarch_storage::error::{Error as StoreError, ErrorKind as StoreErrorKind};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A store operation failed; see the store's own error kind.
    #[display("{_0}")]
    Store(StoreErrorKind),
    /// Bytes about to be archived don't hash to the file's recorded digest.
    /// `actual` is `None` when the recorded algorithm isn't one we can compute.
    #[display("hash mismatch for {file}: expected {expected}, got {}", actual.as_deref().unwrap_or("<unsupported algorithm>"))]
    HashMismatch {
        file: FileRef,
        expected: String,
        actual: Option<String>,
    },
    /// An action names a file the current snapshot doesn't have.
    #[display("metadata inconsistent: {_0} no longer exists")]
    MetadataInconsistent(#[error(not(source))] FileRef),
    /// A plan was requested that can't be carried out as asked.
    #[display("invalid plan: {_0}")]
    InvalidPlan(#[error(not(source))] String),
}

impl ErrorKind {
    /// Convert a store error into an archive error, preserving the storage
    /// crate's `Exn` frame (error tree) as a child in its own error tree.
    #[track_caller]
    pub fn store(err: StoreError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Store(inner))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(inner) if inner.is_retryable())
    }
}
