//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every adapter normalises its client library's failures into two kinds the
//! archive cares about: [`Unavailable`](ErrorKind::Unavailable) (transient,
//! retry later) and [`NotFound`](ErrorKind::NotFound) (terminal for that key).
//! Everything else is a bug or a misconfiguration.

use derive_more::{Display, Error};
use mcarch_model::StoreKind;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Key or identifier does not exist in the store.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The store could not be reached, was overloaded, or timed out.
    #[display("store unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// The store doesn't offer this capability (e.g. pinning on S3).
    #[display("{kind} stores do not support {operation}")]
    Unsupported { kind: StoreKind, operation: &'static str },
    /// Key contains invalid characters or escapes the store prefix.
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
