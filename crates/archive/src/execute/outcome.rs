use super::Action;
use crate::error::ErrorKind;
use mcarch_model::Patch;
use mcarch_storage::error::ErrorKind as StoreErrorKind;
use serde::Serialize;

/// How a single action ended. Every action gets exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Done. Uploads carry the metadata patch they produced (`None` when the
    /// metadata already said so).
    Succeeded { patch: Option<Patch> },
    /// The bytes didn't hash to the recorded digest; nothing was written.
    HashMismatch { expected: String, actual: Option<String> },
    /// The store stayed unreachable through every retry. Safe to retry later.
    Unavailable { reason: String },
    /// Source bytes (or the target) are gone. Needs a human.
    NotFound { reason: String },
    /// The file the action was planned for isn't in the snapshot.
    MetadataInconsistent,
    /// The action succeeded but its patch disagrees with another patch for the
    /// same field. Neither is applied.
    PatchConflict { patch: Patch },
    /// Any other store failure.
    Failed { reason: String },
    /// Not attempted because an earlier action for the same file failed.
    Skipped,
    /// Not attempted because the pass was cancelled.
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Whether this outcome means something went wrong (as opposed to
    /// succeeding or never being attempted).
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Succeeded { .. } | Self::Skipped | Self::Cancelled)
    }
}

impl From<&ErrorKind> for Outcome {
    fn from(kind: &ErrorKind) -> Self {
        match kind {
            ErrorKind::Store(StoreErrorKind::Unavailable(reason)) => Self::Unavailable { reason: reason.clone() },
            ErrorKind::Store(StoreErrorKind::NotFound(reason)) => Self::NotFound { reason: reason.clone() },
            ErrorKind::Store(other) => Self::Failed { reason: other.to_string() },
            ErrorKind::HashMismatch { expected, actual, .. } => Self::HashMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            ErrorKind::MetadataInconsistent(_) => Self::MetadataInconsistent,
            ErrorKind::InvalidPlan(reason) => Self::Failed { reason: reason.clone() },
        }
    }
}

/// One action and how it ended.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    #[serde(flatten)]
    pub action: Action,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Number of times the action was tried (0 if never attempted).
    pub attempts: usize,
}

/// Everything an [`Executor`](super::Executor) run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    /// Per-action results, in completion order.
    pub results: Vec<ActionResult>,
    /// Patches for the metadata sink, in completion order, conflicts removed.
    pub patches: Vec<Patch>,
    /// Whether cancellation stopped the run before every action was tried.
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn failures(&self) -> impl Iterator<Item = &ActionResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}
