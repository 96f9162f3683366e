//! Action execution.
//!
//! The [`Executor`] carries out [`Action`]s against one store and reports a
//! conclusive [`Outcome`] for every one of them. It never writes metadata:
//! successful uploads produce [`Patch`]es for the caller to apply.
//!
//! Actions are grouped by what they touch (the file being patched, or the
//! store key). Groups run in parallel up to the configured concurrency;
//! actions within a group run one after another in the order given, and a
//! failure skips the rest of its group. Transient store failures are retried
//! with exponential backoff before being reported as
//! [`Unavailable`](Outcome::Unavailable).

mod action;
mod ledger;
mod outcome;
mod plan;

pub use self::action::{Action, UploadSource};
pub use self::outcome::{ActionResult, ExecutionReport, Outcome};
pub use self::plan::{ArchivePlan, LocalFile, plan_archive, plan_propagation, plan_prune, plan_visibility};
use self::ledger::PatchLedger;
use crate::error::{Error, ErrorKind, Result};
use backon::{ExponentialBuilder, Retryable};
use exn::OptionExt;
use futures::StreamExt;
use mcarch_model::{Catalog, FileRef, Patch, StoreKind, basename};
use mcarch_storage::StoreHandle;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default number of action groups in flight per store.
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: usize = 3;

/// What serializes actions against each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    File(FileRef),
    Key(String),
}

#[derive(Debug, Clone)]
pub struct Executor {
    concurrency: usize,
    retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, DEFAULT_RETRIES)
    }
}

impl Executor {
    pub fn new(concurrency: usize, retries: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retries,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Override the backoff delays (mostly for tests).
    pub fn with_backoff(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.retries)
            .with_jitter()
    }

    /// Carry out `actions` against `store`.
    ///
    /// Cancellation is checked before each action, never in the middle of
    /// one; actions not started when `cancel` fires end as
    /// [`Outcome::Cancelled`].
    #[instrument(skip_all, fields(store = store.name(), actions = actions.len()))]
    pub async fn execute(
        &self,
        catalog: &Catalog,
        store: &StoreHandle,
        actions: Vec<Action>,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let groups = group(catalog, store.kind(), actions);
        let mut ledger = PatchLedger::default();
        let mut running = futures::stream::iter(groups.into_iter().map(|g| self.run_group(catalog, store, g, cancel)))
            .buffer_unordered(self.concurrency);
        while let Some(results) = running.next().await {
            for result in results {
                ledger.record(result);
            }
        }
        let (results, patches) = ledger.finish();
        let cancelled = results.iter().any(|r| r.outcome == Outcome::Cancelled);
        let failed = results.iter().filter(|r| r.outcome.is_failure()).count();
        tracing::info!(
            store = store.name(),
            succeeded = results.iter().filter(|r| r.outcome.is_success()).count(),
            failed,
            patches = patches.len(),
            cancelled,
            "Execution finished"
        );
        ExecutionReport { results, patches, cancelled }
    }

    async fn run_group(
        &self,
        catalog: &Catalog,
        store: &StoreHandle,
        actions: Vec<Action>,
        cancel: &CancellationToken,
    ) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        let mut failed = false;
        for action in actions {
            if cancel.is_cancelled() {
                results.push(ActionResult { action, outcome: Outcome::Cancelled, attempts: 0 });
                continue;
            }
            if failed {
                results.push(ActionResult { action, outcome: Outcome::Skipped, attempts: 0 });
                continue;
            }
            let mut attempts = 0;
            let result = (|| {
                attempts += 1;
                self.run_action(catalog, store, &action)
            })
            .retry(self.backoff())
            .when(|e: &Error| e.is_retryable())
            .notify(|e: &Error, delay: Duration| {
                tracing::warn!(store = store.name(), %action, error = %e, ?delay, "Retrying action");
            })
            .await;
            let outcome = match result {
                Ok(patch) => {
                    tracing::info!(store = store.name(), %action, "Action succeeded");
                    Outcome::Succeeded { patch }
                },
                Err(e) => {
                    tracing::warn!(store = store.name(), %action, error = ?e, "Action failed");
                    Outcome::from(&*e)
                },
            };
            failed = outcome.is_failure();
            results.push(ActionResult { action, outcome, attempts });
        }
        results
    }

    async fn run_action(&self, catalog: &Catalog, store: &StoreHandle, action: &Action) -> Result<Option<Patch>> {
        match action {
            Action::Upload { file, source } => upload(catalog, store, file, source).await,
            Action::Pin { id, .. } => {
                store.pin(id).await.map_err(ErrorKind::store)?;
                Ok(None)
            },
            Action::SetVisibility { key, public, .. } => {
                store.set_public(key, *public).await.map_err(ErrorKind::store)?;
                Ok(None)
            },
            Action::DeleteOrphan { key } => {
                let removed = match store.capabilities().pinning {
                    true => store.unpin(key).await,
                    false => store.delete(key).await,
                };
                removed.map_err(ErrorKind::store)?;
                Ok(None)
            },
        }
    }
}

/// Upload one file's bytes, behind the integrity gate.
async fn upload(catalog: &Catalog, store: &StoreHandle, file_ref: &FileRef, source: &UploadSource) -> Result<Option<Patch>> {
    let file = catalog.file(file_ref).ok_or_raise(|| ErrorKind::MetadataInconsistent(file_ref.clone()))?;
    let fetched;
    let bytes: &[u8] = match source {
        UploadSource::Bytes(bytes) => bytes.as_slice(),
        UploadSource::Store { store: from, key } => {
            fetched = from.get(key).await.map_err(ErrorKind::store)?;
            fetched.as_slice()
        },
    };
    if !file.hash.matches(bytes) {
        exn::bail!(ErrorKind::HashMismatch {
            file: file_ref.clone(),
            expected: file.hash.digest.clone(),
            actual: file.hash.algorithm.digest(bytes),
        });
    }
    let kind = store.kind();
    let reference = match kind {
        StoreKind::Object => {
            let key = file.object_key();
            store.put(&key, bytes).await.map_err(ErrorKind::store)?.key
        },
        StoreKind::Content => {
            store.put(basename(&file.filename), bytes).await.map_err(ErrorKind::store)?.key
        },
    };
    // Nothing to patch if the metadata already records this reference.
    if file.archive.get(kind) == Some(reference.as_str()) {
        return Ok(None);
    }
    Ok(Some(Patch::new(file_ref.clone(), kind.patch_field(), reference)))
}

/// Split actions into serialized groups, keeping first-seen group order and
/// the given order within each group.
fn group(catalog: &Catalog, kind: StoreKind, actions: Vec<Action>) -> Vec<Vec<Action>> {
    let mut groups: Vec<Vec<Action>> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    for action in actions {
        let key = match &action {
            // An object upload and the visibility change that follows it
            // touch the same key, so they share a group.
            Action::Upload { file, .. } => match (kind, catalog.file(file)) {
                (StoreKind::Object, Some(f)) => GroupKey::Key(f.object_key()),
                _ => GroupKey::File(file.clone()),
            },
            Action::Pin { id, .. } => GroupKey::Key(id.clone()),
            Action::SetVisibility { key, .. } | Action::DeleteOrphan { key } => GroupKey::Key(key.clone()),
        };
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(action);
    }
    groups
}
