//! Store key validation.
//!
//! Keys are `/`-separated strings (`{digest}/{filename}` in object stores, a
//! bare identifier in content networks). Adapters run every key through
//! [`validate`] before it reaches the wire so that a hostile filename in a
//! metadata document can't address something outside the archive.

use crate::error::{ErrorKind, Result};

/// Validates a store key and returns its normalized form.
///
/// Empty segments and `.` segments are dropped, `..` may not climb above the
/// root, and null bytes or backslashes are rejected outright.
///
/// # Examples
///
/// ```
/// use mcarch_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("abcd1234/examplemod-1.0.jar").is_ok());
/// assert!(validate_key("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").is_ok());
/// // Invalid keys
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a\0b").is_err());
/// // Keys get normalized
/// assert_eq!(validate_key("/abcd//./file.jar/").unwrap(), "abcd/file.jar");
/// ```
pub fn validate(key: impl AsRef<str>) -> Result<String> {
    let key = key.as_ref();
    // Null bytes truncate in C-based clients; backslashes mean someone fed us
    // a Windows path instead of a key.
    if key.contains(['\0', '\\']) {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    let mut segments = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
            s => segments.push(s),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(segments.join("/")),
    }
}
