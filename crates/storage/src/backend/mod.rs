//! Content store trait and implementations.
//!
//! This module defines the [`ContentStore`] trait, a single capability
//! interface over the two kinds of store the archive writes to (S3-compatible
//! object stores and IPFS-style content networks). The reconciler and the
//! executor are written once against this trait; they ask a store what it
//! [can do](Capabilities) rather than which implementation it is.
//!

#[cfg(feature = "ipfs")]
mod ipfs;
#[cfg(feature = "mock")]
mod mock;
mod ro;
#[cfg(feature = "s3")]
mod s3;
mod timeout;

#[cfg(feature = "ipfs")]
pub use self::ipfs::IpfsStore;
#[cfg(feature = "mock")]
pub use self::mock::MockStore;
pub use self::ro::ReadOnlyStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
pub use self::timeout::TimeoutStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use mcarch_model::StoreKind;
use std::collections::BTreeSet;
use std::pin::Pin;

pub(crate) type KeyStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Acknowledgement of a successful [`put`](ContentStore::put).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Key the bytes are now stored under. For object stores this is the key
    /// that was asked for; for content networks it is the identifier the
    /// network assigned.
    pub key: String,
}

/// Optional capabilities a store may offer on top of the basic CRUD surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `pin`, `unpin`, `list_pinned` and `stat_size`.
    pub pinning: bool,
    /// `set_public` and `is_public`.
    pub visibility: bool,
    /// `make_directory`.
    pub directories: bool,
}

impl Capabilities {
    /// What a store of the given kind normally offers.
    pub fn for_kind(kind: StoreKind) -> Self {
        match kind {
            StoreKind::Object => Self { visibility: true, ..Self::default() },
            StoreKind::Content => Self { pinning: true, directories: true, ..Self::default() },
        }
    }
}

/// One `(name, identifier)` link inside a synthesized directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirectoryEntry {
    pub name: String,
    pub id: String,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self { name: name.into(), id: id.into() }
    }
}

fn unsupported<T>(kind: StoreKind, operation: &'static str) -> Result<T> {
    exn::bail!(ErrorKind::Unsupported { kind, operation })
}

/// Unified interface for content stores.
///
/// All operations are asynchronous and fail with either
/// [`Unavailable`](ErrorKind::Unavailable) (transient; the caller may retry
/// with backoff) or [`NotFound`](ErrorKind::NotFound) (terminal for that
/// key). Asking a store for something already true is never an error:
/// putting an existing key, deleting a missing one, pinning a pinned
/// identifier all succeed.
///
/// Capability methods have default implementations that fail with
/// [`Unsupported`](ErrorKind::Unsupported); implementations override the
/// ones they advertise in [`capabilities()`](Self::capabilities).
///
/// # Examples
///
/// ```
/// use mcarch_storage::{ContentStore, error::Result};
///
/// async fn archive_once(store: &dyn ContentStore, key: &str, bytes: &[u8]) -> Result<String> {
///     if store.exists(key).await? {
///         return Ok(key.to_string());
///     }
///     Ok(store.put(key, bytes).await?.key)
/// }
/// ```
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Name of the configured store (name taken from the configuration
    /// object key). Used for logging and reports only.
    fn name(&self) -> &str;

    /// Which family of store this is; decides how files are keyed.
    fn kind(&self) -> StoreKind;

    /// Optional capabilities this store offers.
    fn capabilities(&self) -> Capabilities {
        Capabilities::for_kind(self.kind())
    }

    /// Store `data`.
    ///
    /// Idempotent: storing the same key twice is a no-op success. Content
    /// networks ignore the key except as a name hint and return the
    /// identifier they assigned in [`Ack::key`].
    async fn put(&self, key: &str, data: &[u8]) -> Result<Ack>;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Check whether `key` is present.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Stream every key in the store.
    ///
    /// The stream is finite and can be restarted by calling this method
    /// again. Implementations page through large listings themselves; the
    /// caller only ever sees keys.
    fn list_keys<'a>(&'a self) -> KeyStream<'a>;

    /// Every key in the store, collected from [`list_keys()`](Self::list_keys).
    async fn list_all_keys(&self) -> Result<BTreeSet<String>> {
        self.list_keys().try_collect().await
    }

    /// Remove `key`. Removing something that isn't there succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Ask the network to retain and serve `id`.
    async fn pin(&self, _id: &str) -> Result<()> {
        unsupported(self.kind(), "pin")
    }

    /// Release a previous [`pin`](Self::pin).
    async fn unpin(&self, _id: &str) -> Result<()> {
        unsupported(self.kind(), "unpin")
    }

    /// Every identifier currently pinned.
    async fn list_pinned(&self) -> Result<BTreeSet<String>> {
        unsupported(self.kind(), "list_pinned")
    }

    /// Size in bytes of the content behind `id`.
    async fn stat_size(&self, _id: &str) -> Result<u64> {
        unsupported(self.kind(), "stat_size")
    }

    /// Create a directory object linking each entry's name to its
    /// identifier, returning the directory's identifier.
    async fn make_directory(&self, _entries: &[DirectoryEntry]) -> Result<String> {
        unsupported(self.kind(), "make_directory")
    }

    /// Make `key` publicly readable, or restrict it.
    async fn set_public(&self, _key: &str, _public: bool) -> Result<()> {
        unsupported(self.kind(), "set_public")
    }

    /// Whether `key` is currently publicly readable.
    async fn is_public(&self, _key: &str) -> Result<bool> {
        unsupported(self.kind(), "is_public")
    }
}
