//! Read-only content store.
//!
//! Wraps another store and prevents write operations from executing, while
//! still indicating success on return. This is what `--dry-run` hands to the
//! executor: every read goes to the real store, every mutation is logged and
//! dropped.

use super::{Ack, Capabilities, KeyStream};
use crate::error::Result;
use crate::{ContentStore, StoreHandle, StoreKind};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Read-only content store.
///
/// Wraps another store and silently drops all write operations, logging an
/// [`info event`](tracing::Event). Directory synthesis is masked out of the
/// [capabilities](ContentStore::capabilities) since a directory that was
/// never created has no identifier to report.
#[derive(Clone)]
pub struct ReadOnlyStore {
    inner: StoreHandle,
}

impl ReadOnlyStore {
    pub fn new(inner: StoreHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ContentStore for ReadOnlyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { directories: false, ..self.inner.capabilities() }
    }

    /// Content networks would have assigned an identifier here; without
    /// writing there is none, so the requested key is echoed back.
    async fn put(&self, key: &str, data: &[u8]) -> Result<Ack> {
        tracing::info!(store = self.name(), key, bytes = data.len(), "Skipping put during read-only mode");
        Ok(Ack { key: key.to_string() })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    fn list_keys<'a>(&'a self) -> KeyStream<'a> {
        self.inner.list_keys()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tracing::info!(store = self.name(), key, "Skipping delete during read-only mode");
        Ok(())
    }

    async fn pin(&self, id: &str) -> Result<()> {
        tracing::info!(store = self.name(), id, "Skipping pin during read-only mode");
        Ok(())
    }

    async fn unpin(&self, id: &str) -> Result<()> {
        tracing::info!(store = self.name(), id, "Skipping unpin during read-only mode");
        Ok(())
    }

    async fn list_pinned(&self) -> Result<BTreeSet<String>> {
        self.inner.list_pinned().await
    }

    async fn stat_size(&self, id: &str) -> Result<u64> {
        self.inner.stat_size(id).await
    }

    async fn set_public(&self, key: &str, public: bool) -> Result<()> {
        tracing::info!(store = self.name(), key, public, "Skipping visibility change during read-only mode");
        Ok(())
    }

    async fn is_public(&self, key: &str) -> Result<bool> {
        self.inner.is_public(key).await
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::backend::MockStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_writes_are_dropped() {
        let inner = Arc::new(MockStore::object().with_object("abcd/keep.jar", b"keep", false));
        let store = ReadOnlyStore::new(inner.clone());

        let ack = store.put("ef01/new.jar", b"new").await.unwrap();
        assert_eq!(ack.key, "ef01/new.jar");
        store.delete("abcd/keep.jar").await.unwrap();
        store.set_public("abcd/keep.jar", true).await.unwrap();

        assert_eq!(inner.put_count(), 0);
        assert!(store.exists("abcd/keep.jar").await.unwrap());
        assert!(!store.exists("ef01/new.jar").await.unwrap());
        assert!(!store.is_public("abcd/keep.jar").await.unwrap());
    }

    #[tokio::test]
    async fn test_directories_masked() {
        let store = ReadOnlyStore::new(Arc::new(MockStore::content()));
        let capabilities = store.capabilities();
        assert!(capabilities.pinning);
        assert!(!capabilities.directories);
    }
}
