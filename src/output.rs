//! Printing reports for people or for machines.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use mcarch_archive::execute::ArchivePlan;
use mcarch_archive::{ExecutionReport, PassReport, Report, StorePass};
use serde::Serialize;
use std::io::{self, Write};

/// Write `value` as one line of JSON.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer(&mut out, value).or_raise(|| ErrorKind::Output)?;
    writeln!(out).or_raise(|| ErrorKind::Output)
}

pub fn pass(report: &PassReport) {
    for store in &report.stores {
        store_pass(store);
    }
    for download in &report.downloads {
        println!("{}", download.file);
        for url in &download.urls {
            println!("  {}: {}", url.kind.label(), url.url);
        }
    }
    println!("pass {:?}", report.status);
}

fn store_pass(pass: &StorePass) {
    reconciliation(&pass.report);
    for link in &pass.links {
        println!("  link {} -> {}", link.filename, link.path);
    }
    if let Some(execution) = &pass.execution {
        self::execution(&pass.report.store, execution);
    }
}

pub fn reconciliation(report: &Report) {
    println!("{} ({})", report.store, report.store_kind);
    if let Some(failure) = &report.failure {
        println!("  INCOMPLETE: {failure}");
    }
    for missing in &report.missing {
        println!("  missing {} ({} owners)", missing.key, missing.owners.len());
    }
    for key in &report.orphaned {
        println!("  orphaned {key}");
    }
    for stale in &report.stale {
        println!("  stale {}: {} should be {}", stale.file, stale.recorded, stale.derived);
    }
    for file in &report.unarchived {
        println!("  unarchived {file}");
    }
    for mismatch in &report.visibility {
        let wanted = if mismatch.public { "public" } else { "private" };
        println!("  should be {wanted}: {}", mismatch.key);
    }
    if report.is_consistent() {
        println!("  consistent");
    }
}

pub fn execution(store: &str, report: &ExecutionReport) {
    for result in &report.results {
        println!("  {store}: {} -> {:?} ({} attempts)", result.action, result.outcome, result.attempts);
    }
    for patch in &report.patches {
        println!("  patch {} {} = {}", patch.file, patch.field, patch.value);
    }
}

pub fn plan(store: &str, plan: &ArchivePlan) {
    for path in &plan.unmatched {
        println!("  {store}: no catalog file for {}", path.display());
    }
    for file in &plan.already_archived {
        println!("  {store}: {file} already archived");
    }
}
