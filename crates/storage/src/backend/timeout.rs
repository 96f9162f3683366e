//! Per-call deadline for any content store.

use super::{Ack, Capabilities, DirectoryEntry, KeyStream};
use crate::error::{ErrorKind, Result};
use crate::{ContentStore, StoreHandle, StoreKind};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

/// Wraps another store and bounds every call by a deadline.
///
/// A call that exceeds the deadline is abandoned and reported as
/// [`Unavailable`](ErrorKind::Unavailable), which is what the executor's
/// retry policy keys on. Listings apply the deadline to each page of keys
/// rather than to the whole listing.
#[derive(Clone)]
pub struct TimeoutStore {
    inner: StoreHandle,
    timeout: Duration,
}

impl TimeoutStore {
    pub fn new(inner: StoreHandle, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(store = self.inner.name(), operation, timeout = ?self.timeout, "Store call timed out");
                exn::bail!(ErrorKind::Unavailable(format!(
                    "{} timed out after {:?} ({operation})",
                    self.inner.name(),
                    self.timeout
                )))
            },
        }
    }
}

#[async_trait]
impl ContentStore for TimeoutStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<Ack> {
        self.bounded("put", self.inner.put(key, data)).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.bounded("exists", self.inner.exists(key)).await
    }

    fn list_keys<'a>(&'a self) -> KeyStream<'a> {
        Box::pin(stream! {
            let mut keys = self.inner.list_keys();
            loop {
                match tokio::time::timeout(self.timeout, keys.next()).await {
                    Ok(Some(item)) => yield item,
                    Ok(None) => break,
                    Err(_elapsed) => {
                        yield Err(exn::Exn::from(ErrorKind::Unavailable(format!(
                            "{} listing timed out after {:?}",
                            self.inner.name(),
                            self.timeout
                        ))));
                        break;
                    },
                }
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn pin(&self, id: &str) -> Result<()> {
        self.bounded("pin", self.inner.pin(id)).await
    }

    async fn unpin(&self, id: &str) -> Result<()> {
        self.bounded("unpin", self.inner.unpin(id)).await
    }

    async fn list_pinned(&self) -> Result<BTreeSet<String>> {
        self.bounded("list_pinned", self.inner.list_pinned()).await
    }

    async fn stat_size(&self, id: &str) -> Result<u64> {
        self.bounded("stat_size", self.inner.stat_size(id)).await
    }

    async fn make_directory(&self, entries: &[DirectoryEntry]) -> Result<String> {
        self.bounded("make_directory", self.inner.make_directory(entries)).await
    }

    async fn set_public(&self, key: &str, public: bool) -> Result<()> {
        self.bounded("set_public", self.inner.set_public(key, public)).await
    }

    async fn is_public(&self, key: &str) -> Result<bool> {
        self.bounded("is_public", self.inner.is_public(key)).await
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backend::MockStore;
    use std::sync::Arc;

    /// Never answers.
    struct Stalled;

    #[async_trait]
    impl ContentStore for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        fn kind(&self) -> StoreKind {
            StoreKind::Object
        }

        async fn put(&self, _key: &str, _data: &[u8]) -> Result<Ack> {
            futures::future::pending().await
        }

        async fn get(&self, _key: &str) -> Result<Vec<u8>> {
            futures::future::pending().await
        }

        async fn exists(&self, _key: &str) -> Result<bool> {
            futures::future::pending().await
        }

        fn list_keys<'a>(&'a self) -> KeyStream<'a> {
            Box::pin(futures::stream::pending())
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_call_is_unavailable() {
        let store = TimeoutStore::new(Arc::new(Stalled), Duration::from_secs(30));
        let err = store.exists("abcd/file.jar").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_listing_is_unavailable() {
        let store = TimeoutStore::new(Arc::new(Stalled), Duration::from_secs(30));
        let err = store.list_all_keys().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_passes_through() {
        let inner = Arc::new(MockStore::object().with_object("abcd/file.jar", b"data", true));
        let store = TimeoutStore::new(inner, Duration::from_secs(30));
        assert_eq!(store.get("abcd/file.jar").await.unwrap(), b"data");
        assert!(store.is_public("abcd/file.jar").await.unwrap());
    }
}
