//! Archive reconciliation and pinning engine.
//!
//! * [`wanted`] works out what a store should hold from a catalog snapshot.
//! * [`reconcile`](reconcile::reconcile) compares that with what a store
//!   actually holds and proposes [`Action`]s.
//! * [`Executor`] carries actions out and returns metadata patches.
//! * [`run_pass`] ties the three together across every store.
//!
//! Catalog snapshots are immutable; [`SnapshotHandle`] swaps whole snapshots
//! between passes.

pub mod error;
pub mod execute;
mod pass;
pub mod reconcile;
mod snapshot;
pub mod wanted;

pub use crate::execute::{Action, ExecutionReport, Executor, Outcome};
pub use crate::pass::{Download, PassOptions, PassReport, PassStatus, StorePass, run_pass};
pub use crate::reconcile::{ReconcileOptions, Reconciliation, Report};
pub use crate::snapshot::SnapshotHandle;
pub use crate::wanted::{WantedSet, derive};
