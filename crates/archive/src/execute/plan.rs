//! Turning requests ("archive these files", "copy S3 into IPFS") into action
//! lists the [`Executor`](super::Executor) can run.

use super::{Action, UploadSource};
use crate::error::{ErrorKind, Result};
use crate::reconcile::Report;
use mcarch_model::{Catalog, File, FileRef, StoreKind};
use mcarch_storage::StoreHandle;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A file on disk the caller wants archived.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub bytes: Arc<Vec<u8>>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { path: path.into(), bytes: Arc::new(bytes.into()) }
    }
}

#[derive(Debug, Default)]
pub struct ArchivePlan {
    pub actions: Vec<Action>,
    /// Local files no catalog file is named after.
    pub unmatched: Vec<PathBuf>,
    /// Catalog files that already record a reference for the store kind.
    pub already_archived: Vec<FileRef>,
}

/// Plan archiving local files into a store of `kind`.
///
/// Local files are matched to catalog files by file name, optionally within
/// one mod. When several catalog files share the name, the one whose digest
/// matches the bytes wins; failing that the first is taken and the integrity
/// gate will reject it. Object-store uploads of public files are followed by
/// a visibility change, since new objects start out private.
pub fn plan_archive(catalog: &Catalog, kind: StoreKind, mod_id: Option<&str>, files: Vec<LocalFile>) -> ArchivePlan {
    let mut plan = ArchivePlan::default();
    for local in files {
        let name = local.path.to_string_lossy();
        let candidates: Vec<(FileRef, &File)> = catalog.find_by_filename(mod_id, &name).collect();
        let chosen = candidates
            .iter()
            .find(|(_, f)| f.hash.matches(&local.bytes))
            .or_else(|| candidates.first());
        let Some((file_ref, file)) = chosen else {
            tracing::warn!(path = %local.path.display(), "No catalog file matches this name");
            plan.unmatched.push(local.path.clone());
            continue;
        };
        if file.is_archived(kind) {
            tracing::info!(file = %file_ref, kind = %kind, "Already archived, skipping");
            plan.already_archived.push(file_ref.clone());
            continue;
        }
        plan.actions.push(Action::Upload { file: file_ref.clone(), source: UploadSource::Bytes(local.bytes.clone()) });
        if kind == StoreKind::Object && file.is_public() {
            plan.actions.push(Action::SetVisibility {
                key: file.object_key(),
                public: true,
                owners: vec![file_ref.clone()],
            });
        }
    }
    plan
}

/// Plan copying every file archived in `from` into a store of kind `to`
/// that doesn't record a reference there yet.
///
/// Bytes are fetched from `from` at the reference the metadata recorded, so
/// they still go through the integrity gate before reaching `to`.
pub fn plan_propagation(catalog: &Catalog, from: &StoreHandle, to: StoreKind) -> Result<Vec<Action>> {
    let source_kind = from.kind();
    if source_kind == to {
        exn::bail!(ErrorKind::InvalidPlan(format!("cannot propagate from {} into another {to} store", from.name())));
    }
    let mut actions = Vec::new();
    for (file_ref, file) in catalog.files() {
        let Some(reference) = file.archive.get(source_kind) else {
            continue;
        };
        if file.is_archived(to) {
            continue;
        }
        actions.push(Action::Upload { file: file_ref.clone(), source: UploadSource::store(from.clone(), reference) });
        if to == StoreKind::Object && file.is_public() {
            actions.push(Action::SetVisibility { key: file.object_key(), public: true, owners: vec![file_ref] });
        }
    }
    Ok(actions)
}

/// Plan setting every recorded object-store key's visibility from the
/// metadata (public unless a `page` URL is present). A key shared by several
/// files is public only if all of them are.
pub fn plan_visibility(catalog: &Catalog) -> Vec<Action> {
    let mut keys: BTreeMap<String, (bool, Vec<FileRef>)> = BTreeMap::new();
    for (file_ref, file) in catalog.files() {
        let Some(key) = file.archive.get(StoreKind::Object) else {
            continue;
        };
        let entry = keys.entry(key.to_string()).or_insert((true, Vec::new()));
        entry.0 &= file.is_public();
        entry.1.push(file_ref);
    }
    keys.into_iter()
        .map(|(key, (public, owners))| Action::SetVisibility { key, public, owners })
        .collect()
}

/// Plan deleting the orphans a reconciliation found.
///
/// Destructive, so it needs `confirm`, and it refuses to work from an
/// incomplete report: a partial listing would make live keys look orphaned.
pub fn plan_prune(report: &Report, confirm: bool) -> Result<Vec<Action>> {
    if report.incomplete {
        exn::bail!(ErrorKind::InvalidPlan(format!("refusing to prune {} from an incomplete report", report.store)));
    }
    if !confirm && !report.orphaned.is_empty() {
        exn::bail!(ErrorKind::InvalidPlan(format!(
            "refusing to delete {} orphaned keys from {} without confirmation",
            report.orphaned.len(),
            report.store
        )));
    }
    Ok(report.orphaned.iter().map(|key| Action::DeleteOrphan { key: key.clone() }).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wanted::tests::catalog;
    use mcarch_model::{Hash, SourceUrl, UrlKind};
    use mcarch_storage::backend::MockStore;
    use std::ops::Deref;

    #[test]
    fn archive_skips_unmatched_and_already_archived() {
        let catalog = catalog(vec![
            File::new("a.jar", Hash::of_bytes(b"a")),
            File::new("b.jar", Hash::of_bytes(b"b")).with_archive(StoreKind::Object, "x/b.jar"),
        ]);
        let plan = plan_archive(
            &catalog,
            StoreKind::Object,
            None,
            vec![
                LocalFile::new("/downloads/a.jar", b"a"),
                LocalFile::new("b.jar", b"b"),
                LocalFile::new("c.jar", b"c"),
            ],
        );
        assert_eq!(plan.actions.len(), 2);
        assert!(matches!(&plan.actions[0], Action::Upload { file, .. } if file.file == "a.jar"));
        assert_eq!(plan.unmatched, vec![PathBuf::from("c.jar")]);
        assert_eq!(plan.already_archived.len(), 1);
    }

    #[test]
    fn archive_of_private_file_has_no_visibility_action() {
        let page = SourceUrl::new(UrlKind::Page, "https://example.net/a");
        let catalog = catalog(vec![File::new("a.jar", Hash::of_bytes(b"a")).with_url(page)]);
        let plan = plan_archive(&catalog, StoreKind::Object, None, vec![LocalFile::new("a.jar", b"a")]);
        assert_eq!(plan.actions.len(), 1);
    }

    #[test]
    fn propagation_copies_only_what_the_target_lacks() {
        let catalog = catalog(vec![
            File::new("a.jar", Hash::sha256("d1")).with_archive(StoreKind::Object, "d1/a.jar"),
            File::new("b.jar", Hash::sha256("d2"))
                .with_archive(StoreKind::Object, "d2/b.jar")
                .with_archive(StoreKind::Content, "QmB"),
            File::new("c.jar", Hash::sha256("d3")),
        ]);
        let from: StoreHandle = Arc::new(MockStore::object());
        let actions = plan_propagation(&catalog, &from, StoreKind::Content).unwrap();
        assert_eq!(actions.len(), 1);
        let Action::Upload { file, source } = &actions[0] else {
            panic!("expected an upload");
        };
        assert_eq!(file.file, "a.jar");
        assert!(matches!(source, UploadSource::Store { key, .. } if key == "d1/a.jar"));
    }

    #[test]
    fn propagation_into_same_kind_is_rejected() {
        let from: StoreHandle = Arc::new(MockStore::content());
        let err = plan_propagation(&Catalog::default(), &from, StoreKind::Content).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::InvalidPlan(_)));
    }

    #[test]
    fn visibility_never_publishes_page_files() {
        let page = SourceUrl::new(UrlKind::Page, "https://example.net/a");
        let original = SourceUrl::new(UrlKind::Original, "https://example.net/a.jar");
        let catalog = catalog(vec![
            File::new("a.jar", Hash::sha256("d1")).with_archive(StoreKind::Object, "d1/a.jar").with_url(page).with_url(original),
            File::new("b.jar", Hash::sha256("d2")).with_archive(StoreKind::Object, "d2/b.jar"),
        ]);
        let actions = plan_visibility(&catalog);
        let public: Vec<_> = actions
            .iter()
            .map(|a| match a {
                Action::SetVisibility { key, public, .. } => (key.as_str(), *public),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(public, vec![("d1/a.jar", false), ("d2/b.jar", true)]);
    }

    #[test]
    fn prune_requires_confirmation_and_a_complete_report() {
        let mut report = Report::new("s3", StoreKind::Object);
        report.orphaned = vec!["zz/old.jar".into()];
        assert!(plan_prune(&report, false).is_err());
        assert_eq!(plan_prune(&report, true).unwrap().len(), 1);
        report.incomplete = true;
        assert!(plan_prune(&report, true).is_err());
    }
}
