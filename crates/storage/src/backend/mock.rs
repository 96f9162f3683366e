//! In-memory content store for testing.

use super::{Ack, Capabilities, DirectoryEntry, KeyStream};
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::{ContentStore, StoreKind};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct MockObject {
    data: Vec<u8>,
    public: bool,
}

/// In-memory content store for testing.
///
/// Behaves like either an object store or a content network depending on the
/// [`StoreKind`] it was built with. State lives behind a [`RwLock`] so that
/// every trait method works on `&self`.
///
/// Failure injection: [`set_unavailable`](Self::set_unavailable) makes every
/// call fail with [`Unavailable`](ErrorKind::Unavailable) until cleared, and
/// [`fail_next`](Self::fail_next) fails only the next `n` calls.
///
/// # Examples
///
/// ```
/// use mcarch_storage::backend::MockStore;
/// use mcarch_storage::ContentStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::object().with_object("abcd/one.jar", b"one", true);
/// assert!(store.exists("abcd/one.jar").await?);
///
/// store.put("ef01/two.jar", b"two").await?;
/// assert_eq!(store.put_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    name: String,
    kind: StoreKind,
    capabilities: Capabilities,
    objects: RwLock<BTreeMap<String, MockObject>>,
    pins: RwLock<BTreeSet<String>>,
    directories: RwLock<BTreeMap<String, Vec<DirectoryEntry>>>,
    unavailable: AtomicBool,
    failures: AtomicUsize,
    puts: AtomicUsize,
}

impl MockStore {
    pub fn new(kind: StoreKind) -> Self {
        Self {
            name: format!("mock-{kind}"),
            kind,
            capabilities: Capabilities::for_kind(kind),
            objects: RwLock::default(),
            pins: RwLock::default(),
            directories: RwLock::default(),
            unavailable: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    /// An empty mock object store.
    pub fn object() -> Self {
        Self::new(StoreKind::Object)
    }

    /// An empty mock content network.
    pub fn content() -> Self {
        Self::new(StoreKind::Content)
    }

    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Pre-populate an object under an explicit key.
    ///
    /// Panics if the key fails validation. If test setup is wrong, then test
    /// should not pass.
    pub fn with_object(mut self, key: &str, data: impl Into<Vec<u8>>, public: bool) -> Self {
        let Ok(key) = validate_key(key) else {
            // The panic here is DELIBERATE. MockStore is intended to be used
            // in tests; panics are expected. There is no error result.
            panic!("MockStore::with_object: invalid key {key}");
        };
        self.objects.get_mut().insert(key, MockObject { data: data.into(), public });
        self
    }

    /// Pre-populate pins, whether or not their content exists.
    pub fn with_pins(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pins.get_mut().extend(ids.into_iter().map(Into::into));
        self
    }

    /// The identifier this mock assigns to `data` in a content network.
    pub fn content_id(data: &[u8]) -> String {
        format!("mock{}", &blake3::hash(data).to_hex()[..32])
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls with [`Unavailable`](ErrorKind::Unavailable).
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Current visibility of an object, if it exists.
    pub async fn visibility(&self, key: &str) -> Option<bool> {
        self.objects.read().await.get(key).map(|o| o.public)
    }

    pub async fn pinned(&self) -> BTreeSet<String> {
        self.pins.read().await.clone()
    }

    pub async fn directory(&self, id: &str) -> Option<Vec<DirectoryEntry>> {
        self.directories.read().await.get(id).cloned()
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Unavailable(format!("{} is down ({operation})", self.name)));
        }
        let decremented = self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if decremented.is_ok() {
            exn::bail!(ErrorKind::Unavailable(format!("{} failed {operation}", self.name)));
        }
        Ok(())
    }

    fn require(&self, enabled: bool, operation: &'static str) -> Result<()> {
        match enabled {
            true => Ok(()),
            false => exn::bail!(ErrorKind::Unsupported { kind: self.kind, operation }),
        }
    }
}

#[async_trait]
impl ContentStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<Ack> {
        self.check("put")?;
        let key = match self.kind {
            StoreKind::Object => validate_key(key)?,
            StoreKind::Content => Self::content_id(data),
        };
        let mut objects = self.objects.write().await;
        // Overwriting keeps whatever visibility the object already had.
        let public = objects.get(&key).is_some_and(|o| o.public);
        objects.insert(key.clone(), MockObject { data: data.to_vec(), public });
        if self.kind == StoreKind::Content {
            // Like `ipfs add`, adding content pins it.
            self.pins.write().await.insert(key.clone());
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(Ack { key })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.check("get")?;
        let key = validate_key(key)?;
        let objects = self.objects.read().await;
        let object = objects.get(&key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.clone())))?;
        Ok(object.data.clone())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check("exists")?;
        let key = validate_key(key)?;
        Ok(self.objects.read().await.contains_key(&key))
    }

    fn list_keys<'a>(&'a self) -> KeyStream<'a> {
        Box::pin(stream! {
            if let Err(e) = self.check("list") {
                yield Err(e);
                return;
            }
            // Snapshot the keys under the read lock, then drop it before
            // yielding to avoid holding the lock across yield points.
            let keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
            for key in keys {
                yield Ok(key);
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check("delete")?;
        let key = validate_key(key)?;
        self.objects.write().await.remove(&key);
        self.pins.write().await.remove(&key);
        Ok(())
    }

    async fn pin(&self, id: &str) -> Result<()> {
        self.require(self.capabilities.pinning, "pin")?;
        self.check("pin")?;
        if !self.objects.read().await.contains_key(id) && !self.directories.read().await.contains_key(id) {
            exn::bail!(ErrorKind::NotFound(id.to_string()));
        }
        self.pins.write().await.insert(id.to_string());
        Ok(())
    }

    async fn unpin(&self, id: &str) -> Result<()> {
        self.require(self.capabilities.pinning, "unpin")?;
        self.check("unpin")?;
        self.pins.write().await.remove(id);
        Ok(())
    }

    async fn list_pinned(&self) -> Result<BTreeSet<String>> {
        self.require(self.capabilities.pinning, "list_pinned")?;
        self.check("list_pinned")?;
        Ok(self.pins.read().await.clone())
    }

    async fn stat_size(&self, id: &str) -> Result<u64> {
        self.require(self.capabilities.pinning, "stat_size")?;
        self.check("stat_size")?;
        let objects = self.objects.read().await;
        let object = objects.get(id).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(id.to_string())))?;
        Ok(object.data.len() as u64)
    }

    async fn make_directory(&self, entries: &[DirectoryEntry]) -> Result<String> {
        self.require(self.capabilities.directories, "make_directory")?;
        self.check("make_directory")?;
        let mut entries = entries.to_vec();
        entries.sort();
        let listing: String = entries.iter().map(|e| format!("{}={}\n", e.name, e.id)).collect();
        let id = Self::content_id(listing.as_bytes());
        self.directories.write().await.insert(id.clone(), entries);
        Ok(id)
    }

    async fn set_public(&self, key: &str, public: bool) -> Result<()> {
        self.require(self.capabilities.visibility, "set_public")?;
        self.check("set_public")?;
        let key = validate_key(key)?;
        let mut objects = self.objects.write().await;
        let object = objects.get_mut(&key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.clone())))?;
        object.public = public;
        Ok(())
    }

    async fn is_public(&self, key: &str) -> Result<bool> {
        self.require(self.capabilities.visibility, "is_public")?;
        self.check("is_public")?;
        let key = validate_key(key)?;
        let objects = self.objects.read().await;
        let object = objects.get(&key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.clone())))?;
        Ok(object.public)
    }
}
