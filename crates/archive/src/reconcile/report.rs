use crate::wanted::StaleRef;
use mcarch_model::{FileRef, StoreKind};
use serde::Serialize;

/// A wanted key the store doesn't have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingEntry {
    pub key: String,
    pub digest: String,
    pub filename: String,
    pub owners: Vec<FileRef>,
}

/// A present key whose visibility disagrees with the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibilityMismatch {
    pub key: String,
    pub public: bool,
    pub owners: Vec<FileRef>,
}

/// A pinned identifier and what it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinState {
    pub identifier: String,
    pub size: u64,
    pub filenames: Vec<String>,
    /// Whether the content may be advertised (directory links, URLs).
    pub public: bool,
}

/// Result of reconciling one store against one catalog snapshot.
///
/// Every list is sorted by key. When `incomplete` is set the store failed
/// partway through: the lists hold what was worked out before `failure`,
/// and absence from `missing` proves nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub store: String,
    pub store_kind: StoreKind,
    pub missing: Vec<MissingEntry>,
    pub orphaned: Vec<String>,
    pub stale: Vec<StaleRef>,
    pub unarchived: Vec<FileRef>,
    pub visibility: Vec<VisibilityMismatch>,
    pub pin_state: Vec<PinState>,
    pub incomplete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Report {
    pub fn new(store: impl Into<String>, store_kind: StoreKind) -> Self {
        Self {
            store: store.into(),
            store_kind,
            missing: Vec::new(),
            orphaned: Vec::new(),
            stale: Vec::new(),
            unarchived: Vec::new(),
            visibility: Vec::new(),
            pin_state: Vec::new(),
            incomplete: false,
            failure: None,
        }
    }

    /// Mark the report incomplete because of `failure`.
    pub(crate) fn fail(&mut self, failure: impl ToString) {
        let failure = failure.to_string();
        tracing::warn!(store = %self.store, %failure, "Reconciliation aborted");
        self.incomplete = true;
        self.failure = Some(failure);
    }

    /// Nothing missing, orphaned, stale or mis-shared, and the store answered
    /// every question.
    pub fn is_consistent(&self) -> bool {
        !self.incomplete
            && self.missing.is_empty()
            && self.orphaned.is_empty()
            && self.stale.is_empty()
            && self.visibility.is_empty()
    }
}
