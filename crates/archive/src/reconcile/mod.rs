//! Reconciliation: what a store has versus what the catalog wants.
//!
//! [`reconcile`] lists the store and derives the wanted set concurrently,
//! diffs the two, then asks the store the per-key questions its
//! [capabilities](mcarch_storage::Capabilities) allow (visibility, pin sizes)
//! and, for content networks, synthesizes download directories. The result
//! is a [`Report`] for humans plus the [`Action`]s that would close the gap.
//!
//! Orphans are only ever reported. Deleting them takes an explicit, confirmed
//! [`plan_prune`](crate::execute::plan_prune).

mod links;
mod report;

pub use self::links::DirectoryLink;
pub use self::report::{MissingEntry, PinState, Report, VisibilityMismatch};
use crate::execute::{Action, UploadSource};
use crate::wanted::{Ownership, derive};
use futures::{StreamExt, stream};
use mcarch_model::Catalog;
use mcarch_storage::error::Result as StoreResult;
use mcarch_storage::{Capabilities, ContentStore, StoreHandle};
use std::collections::BTreeSet;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Per-key store queries in flight at once.
    pub concurrency: usize,
    /// Create download directories on stores that support them.
    pub synthesize_links: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { concurrency: crate::execute::DEFAULT_CONCURRENCY, synthesize_links: true }
    }
}

/// Everything one reconciliation produced.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub report: Report,
    /// Corrective actions, ordered by kind then key.
    pub actions: Vec<Action>,
    /// Download links from synthesized directories, sorted.
    pub links: Vec<DirectoryLink>,
}

impl Reconciliation {
    fn finish(mut self) -> Self {
        self.actions.sort_by_key(Action::sort_key);
        self.links.sort();
        tracing::info!(
            store = %self.report.store,
            missing = self.report.missing.len(),
            orphaned = self.report.orphaned.len(),
            stale = self.report.stale.len(),
            visibility = self.report.visibility.len(),
            actions = self.actions.len(),
            incomplete = self.report.incomplete,
            "Reconciliation finished"
        );
        self
    }
}

async fn present_keys(store: &dyn ContentStore, capabilities: Capabilities) -> StoreResult<BTreeSet<String>> {
    match capabilities.pinning {
        true => store.list_pinned().await,
        false => store.list_all_keys().await,
    }
}

/// Reconcile one store against `catalog`.
///
/// Never fails outright: a store error stops the work, marks the report
/// incomplete and returns whatever had been worked out so far. It never
/// reports everything as missing because a listing failed.
#[instrument(skip_all, fields(store = store.name(), kind = %store.kind()))]
pub async fn reconcile(catalog: &Catalog, store: &StoreHandle, options: &ReconcileOptions) -> Reconciliation {
    let kind = store.kind();
    let capabilities = store.capabilities();
    let concurrency = options.concurrency.max(1);
    let mut out = Reconciliation {
        report: Report::new(store.name(), kind),
        actions: Vec::new(),
        links: Vec::new(),
    };

    let (wanted, present) = tokio::join!(async { derive(catalog, kind) }, present_keys(store.as_ref(), capabilities));
    out.report.stale = wanted.stale.clone();
    out.report.unarchived = wanted.unarchived.clone();
    let present = match present {
        Ok(present) => present,
        Err(e) => {
            out.report.fail(&*e);
            return out.finish();
        },
    };
    tracing::debug!(wanted = wanted.len(), present = present.len(), "Listed store");

    for (key, ownership) in &wanted.entries {
        if present.contains(key) {
            continue;
        }
        out.report.missing.push(MissingEntry {
            key: key.clone(),
            digest: ownership.digest.clone(),
            filename: ownership.filename.clone(),
            owners: ownership.owners.clone(),
        });
        if capabilities.pinning {
            out.actions.push(Action::Pin { id: key.clone(), owners: ownership.owners.clone() });
        }
    }
    out.report.orphaned = present.iter().filter(|key| !wanted.contains(key)).cloned().collect();

    // A stale reference is re-keyed by copying whichever of the two keys
    // actually holds the bytes onto the derived key.
    for stale in &wanted.stale {
        let source = [&stale.derived, &stale.recorded].into_iter().find(|key| present.contains(key.as_str()));
        if let Some(source) = source {
            out.actions.push(Action::Upload {
                file: stale.file.clone(),
                source: UploadSource::store(store.clone(), source.clone()),
            });
        }
    }

    let held: Vec<(&String, &Ownership)> = wanted.entries.iter().filter(|(key, _)| present.contains(*key)).collect();

    if capabilities.visibility {
        let mut checks: Vec<_> = stream::iter(held.iter().copied())
            .map(|(key, ownership)| async move { (key, ownership, store.is_public(key).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        checks.sort_by(|a, b| a.0.cmp(b.0));
        for (key, ownership, actual) in checks {
            match actual {
                Ok(actual) if actual == ownership.public => {},
                Ok(_) => {
                    out.report.visibility.push(VisibilityMismatch {
                        key: key.clone(),
                        public: ownership.public,
                        owners: ownership.owners.clone(),
                    });
                    out.actions.push(Action::SetVisibility {
                        key: key.clone(),
                        public: ownership.public,
                        owners: ownership.owners.clone(),
                    });
                },
                Err(e) => {
                    out.report.fail(&*e);
                    return out.finish();
                },
            }
        }
    }

    if capabilities.pinning {
        let mut sizes: Vec<_> = stream::iter(held.iter().copied())
            .map(|(key, ownership)| async move { (key, ownership, store.stat_size(key).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        sizes.sort_by(|a, b| a.0.cmp(b.0));
        for (key, ownership, size) in sizes {
            match size {
                Ok(size) => {
                    let mut filenames: Vec<String> = ownership.owners.iter().map(|o| o.file.clone()).collect();
                    filenames.sort();
                    filenames.dedup();
                    out.report.pin_state.push(PinState {
                        identifier: key.clone(),
                        size,
                        filenames,
                        public: ownership.public,
                    });
                },
                Err(e) => {
                    out.report.fail(&*e);
                    return out.finish();
                },
            }
        }
    }

    if capabilities.directories && options.synthesize_links {
        // Private content is pinned but never advertised.
        let directories: Vec<_> = stream::iter(held.iter().copied().filter(|(_, o)| o.public))
            .map(|(key, ownership)| async move {
                let entries = links::entries(key, ownership);
                let directory = store.make_directory(&entries).await;
                (ownership, entries, directory)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        for (ownership, entries, directory) in directories {
            match directory {
                Ok(directory) => out.links.extend(links::links(&directory, ownership, &entries)),
                Err(e) => {
                    out.report.fail(&*e);
                    return out.finish();
                },
            }
        }
    }

    out.finish()
}
