//! One reconciliation pass over every configured store.

use crate::execute::{ExecutionReport, Executor};
use crate::reconcile::{DirectoryLink, ReconcileOptions, Report, reconcile};
use futures::future::join_all;
use mcarch_model::{Catalog, FileRef, Patch, SourceUrl, StoreKind, basename};
use mcarch_storage::StoreHandle;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    pub reconcile: ReconcileOptions,
    /// Execute the corrective actions reconciliation produces. Without it a
    /// pass only reports.
    pub repair: bool,
    /// Public base URL per store kind (bucket website, IPFS gateway). Files
    /// archived in a kind with a base get a download URL in the report.
    pub public_urls: BTreeMap<StoreKind, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    /// At least one store's report is incomplete.
    Incomplete,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorePass {
    pub report: Report,
    pub links: Vec<DirectoryLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
}

impl StorePass {
    /// Nothing is left for this store: either reconciliation found it
    /// consistent, or every discrepancy it found was closed by an action that
    /// succeeded.
    ///
    /// Orphans are never repaired by a pass, and neither are keys an object
    /// store is missing or stale references whose bytes are nowhere in the
    /// store; any of them keeps the store unsettled.
    pub fn is_settled(&self) -> bool {
        let Some(execution) = &self.execution else {
            return self.report.is_consistent();
        };
        if self.report.incomplete || execution.cancelled || execution.has_failures() || !self.report.orphaned.is_empty() {
            return false;
        }
        let done: BTreeSet<String> = execution
            .results
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.action.subject())
            .collect();
        // An upload onto a key also closes that key's missing entry.
        let covered = |key: &str, owners: &[FileRef]| done.contains(key) || owners.iter().any(|o| done.contains(&o.to_string()));
        self.report.missing.iter().all(|m| covered(&m.key, &m.owners))
            && self.report.stale.iter().all(|s| done.contains(&s.file.to_string()))
            && self.report.visibility.iter().all(|v| covered(&v.key, &v.owners))
    }
}

/// Where a file can be publicly downloaded from, once the pass is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub file: FileRef,
    /// The file's own URLs followed by the ones synthesized from the
    /// configured public bases.
    pub urls: Vec<SourceUrl>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub revision: Option<String>,
    pub stores: Vec<StorePass>,
    pub status: PassStatus,
    /// Files that gained a public URL from an archived copy, in catalog order.
    pub downloads: Vec<Download>,
}

impl PassReport {
    /// Every surviving metadata patch, store by store.
    pub fn patches(&self) -> impl Iterator<Item = &Patch> {
        self.stores.iter().filter_map(|s| s.execution.as_ref()).flat_map(|e| e.patches.iter())
    }

    /// Completed, and every store is [settled](StorePass::is_settled).
    pub fn is_clean(&self) -> bool {
        self.status == PassStatus::Completed && self.stores.iter().all(StorePass::is_settled)
    }
}

/// Project the public URL list of every file in `catalog`.
///
/// Content-network URLs point into the synthesized download directory when
/// one holds the file.
fn downloads(catalog: &Catalog, stores: &[StorePass], public_urls: &BTreeMap<StoreKind, String>) -> Vec<Download> {
    if public_urls.is_empty() {
        return Vec::new();
    }
    let bases: Vec<(StoreKind, &str)> = public_urls.iter().map(|(kind, base)| (*kind, base.as_str())).collect();
    let links: Vec<&DirectoryLink> = stores
        .iter()
        .filter(|s| s.report.store_kind == StoreKind::Content)
        .flat_map(|s| s.links.iter())
        .collect();
    catalog
        .files()
        .filter_map(|(file_ref, file)| {
            let name = basename(&file.filename);
            let link = links.iter().find(|l| l.digest == file.hash.digest && l.filename == name);
            let urls = file.visible_urls(&bases, link.map(|l| l.path.as_str()));
            (urls.len() > file.urls.len()).then_some(Download { file: file_ref, urls })
        })
        .collect()
}

/// Run one pass: reconcile every store concurrently against `catalog` and,
/// if asked, execute the resulting actions.
///
/// This is the only entry point a scheduler needs. It doesn't schedule
/// anything itself, and it must not be run twice at once against the same
/// store: a second pass would list the store while the first one's actions
/// are still landing. Callers enforce that.
///
/// Store failures never escape; they end up in the store's report.
#[instrument(skip_all, fields(revision = catalog.revision.as_deref().unwrap_or("-"), stores = stores.len()))]
pub async fn run_pass(
    catalog: Arc<Catalog>,
    stores: &[StoreHandle],
    executor: &Executor,
    options: &PassOptions,
    cancel: &CancellationToken,
) -> PassReport {
    let passes = join_all(stores.iter().map(|store| {
        let catalog = &catalog;
        async move {
            if cancel.is_cancelled() {
                let mut report = Report::new(store.name(), store.kind());
                report.fail("cancelled before reconciliation");
                return StorePass { report, links: Vec::new(), execution: None };
            }
            let reconciliation = reconcile(catalog, store, &options.reconcile).await;
            let execution = match options.repair && !reconciliation.report.incomplete {
                true => Some(executor.execute(catalog, store, reconciliation.actions, cancel).await),
                false => None,
            };
            StorePass { report: reconciliation.report, links: reconciliation.links, execution }
        }
    }))
    .await;

    let status = if cancel.is_cancelled() {
        PassStatus::Cancelled
    } else if passes.iter().any(|p| p.report.incomplete) {
        PassStatus::Incomplete
    } else {
        PassStatus::Completed
    };
    // Project against the snapshot as it will be once this pass's patches
    // are applied.
    let patches: Vec<&Patch> = passes.iter().filter_map(|p| p.execution.as_ref()).flat_map(|e| e.patches.iter()).collect();
    let downloads = match catalog.apply(patches) {
        Ok(patched) => downloads(&patched, &passes, &options.public_urls),
        Err(e) => {
            tracing::warn!(error = %e, "Patches don't apply, projecting URLs from the unpatched snapshot");
            downloads(&catalog, &passes, &options.public_urls)
        },
    };
    tracing::info!(?status, downloads = downloads.len(), "Pass finished");
    PassReport { revision: catalog.revision.clone(), stores: passes, status, downloads }
}
