//! The current catalog, swapped atomically between passes.

use mcarch_model::error::Result as ModelResult;
use mcarch_model::{Catalog, Patch};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle on the current catalog snapshot.
///
/// Readers take an `Arc<Catalog>` and keep it for as long as they like; a
/// reload swaps in a whole new snapshot, so nobody ever sees half of one.
/// Cloning the handle shares the same slot.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    slot: Arc<watch::Sender<Arc<Catalog>>>,
}

impl SnapshotHandle {
    pub fn new(catalog: Catalog) -> Self {
        let (slot, _) = watch::channel(Arc::new(catalog));
        Self { slot: Arc::new(slot) }
    }

    /// The snapshot in effect right now.
    pub fn current(&self) -> Arc<Catalog> {
        self.slot.borrow().clone()
    }

    /// Swap in `catalog`, returning the snapshot it replaced.
    pub fn replace(&self, catalog: Catalog) -> Arc<Catalog> {
        let previous = self.slot.send_replace(Arc::new(catalog));
        tracing::debug!(
            from = previous.revision.as_deref().unwrap_or("-"),
            to = self.slot.borrow().revision.as_deref().unwrap_or("-"),
            "Catalog snapshot replaced"
        );
        previous
    }

    /// Apply `patches` to the current snapshot and swap the result in.
    ///
    /// Assumes a single writer; a concurrent `replace` between reading the
    /// current snapshot and swapping would be lost.
    pub fn apply(&self, patches: &[Patch]) -> ModelResult<Arc<Catalog>> {
        let next = self.current().apply(patches)?;
        self.replace(next);
        Ok(self.current())
    }

    /// Be told when the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Catalog>> {
        self.slot.subscribe()
    }
}
