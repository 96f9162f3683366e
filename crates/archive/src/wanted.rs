//! Wanted-set derivation.
//!
//! Walks a catalog snapshot and works out which keys *should* exist in a
//! store of a given kind, and which files own each key. Pure; no store is
//! consulted.

use mcarch_model::{Catalog, FileRef, StoreKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// Who owns one wanted key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ownership {
    pub digest: String,
    /// Filename of the first owner; the one used for directory links and
    /// display.
    pub filename: String,
    /// Every file whose bytes live under this key (at least one).
    pub owners: Vec<FileRef>,
    /// Whether the bytes may be advertised. A key shared by several files is
    /// public only if every owner is.
    pub public: bool,
}

/// A file whose recorded object-store reference isn't the key its digest
/// and filename derive. The derived key is what's wanted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StaleRef {
    pub file: FileRef,
    pub recorded: String,
    pub derived: String,
}

/// Everything a store of one kind should hold, keyed by store key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WantedSet {
    pub kind: Option<StoreKind>,
    pub entries: BTreeMap<String, Ownership>,
    pub stale: Vec<StaleRef>,
    /// Files with no reference for this store kind yet: candidates for
    /// upload, not reconciliation.
    pub unarchived: Vec<FileRef>,
}

impl WantedSet {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derive the wanted set for a store of `kind` from `catalog`.
///
/// * Object stores want `{digest}/{basename(filename)}` for every file that
///   records an object-store reference. Two files with the same digest but
///   different names give two keys.
/// * Content networks want the identifier each file recorded; files sharing
///   one identifier coalesce into one ownership record.
///
/// Empty or missing references mean "not archived" and land in
/// [`WantedSet::unarchived`]; they're never an error.
pub fn derive(catalog: &Catalog, kind: StoreKind) -> WantedSet {
    let mut wanted = WantedSet { kind: Some(kind), ..WantedSet::default() };
    for (file_ref, file) in catalog.files() {
        let Some(recorded) = file.archive.get(kind) else {
            wanted.unarchived.push(file_ref);
            continue;
        };
        let key = match kind {
            StoreKind::Object => {
                let derived = file.object_key();
                if recorded != derived {
                    wanted.stale.push(StaleRef {
                        file: file_ref.clone(),
                        recorded: recorded.to_string(),
                        derived: derived.clone(),
                    });
                }
                derived
            },
            StoreKind::Content => recorded.to_string(),
        };
        let public = file.is_public();
        wanted
            .entries
            .entry(key)
            .and_modify(|o| {
                o.owners.push(file_ref.clone());
                o.public &= public;
            })
            .or_insert_with(|| Ownership {
                digest: file.hash.digest.clone(),
                filename: file.filename.clone(),
                owners: vec![file_ref.clone()],
                public,
            });
    }
    wanted.stale.sort();
    wanted.unarchived.sort();
    for ownership in wanted.entries.values_mut() {
        ownership.owners.sort();
    }
    wanted
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mcarch_model::{File, Hash, Mod, SourceUrl, UrlKind, Version};

    pub(crate) fn catalog(files: Vec<File>) -> Catalog {
        Catalog::new([Mod {
            id: "examplemod".into(),
            name: "Example Mod".into(),
            authors: vec!["someone".into()],
            desc: String::new(),
            versions: vec![Version {
                name: "1.0".into(),
                desc: String::new(),
                platforms: vec!["1.7.10".into()],
                files,
                extra: Default::default(),
            }],
            extra: Default::default(),
        }])
    }

    #[test]
    fn object_keys_are_derived_from_digest_and_basename() {
        let catalog = catalog(vec![
            File::new("a.jar", Hash::sha256("d1")).with_archive(StoreKind::Object, "d1/a.jar"),
            File::new("b.jar", Hash::sha256("d1")).with_archive(StoreKind::Object, "d1/b.jar"),
            File::new("c.jar", Hash::sha256("d2")),
        ]);
        let wanted = derive(&catalog, StoreKind::Object);
        assert_eq!(wanted.entries.keys().collect::<Vec<_>>(), vec!["d1/a.jar", "d1/b.jar"]);
        assert_eq!(wanted.unarchived, vec![FileRef::new("examplemod", "1.0", "c.jar")]);
        assert!(wanted.stale.is_empty());
    }

    #[test]
    fn stale_object_reference_is_reported_and_derived_key_wanted() {
        let catalog = catalog(vec![File::new("a.jar", Hash::sha256("d1")).with_archive(StoreKind::Object, "old/a.jar")]);
        let wanted = derive(&catalog, StoreKind::Object);
        assert!(wanted.contains("d1/a.jar"));
        assert!(!wanted.contains("old/a.jar"));
        assert_eq!(wanted.stale[0].recorded, "old/a.jar");
        assert_eq!(wanted.stale[0].derived, "d1/a.jar");
    }

    #[test]
    fn content_identifiers_coalesce() {
        let page = SourceUrl::new(UrlKind::Page, "https://example.net/download");
        let catalog = catalog(vec![
            File::new("a.jar", Hash::sha256("d1")).with_archive(StoreKind::Content, "QmShared"),
            File::new("b.jar", Hash::sha256("d1")).with_archive(StoreKind::Content, "QmShared").with_url(page),
            File::new("c.jar", Hash::sha256("d2")),
        ]);
        let wanted = derive(&catalog, StoreKind::Content);
        assert_eq!(wanted.len(), 1);
        let shared = &wanted.entries["QmShared"];
        assert_eq!(shared.owners.len(), 2);
        assert_eq!(shared.filename, "a.jar");
        // One private owner makes the whole record private.
        assert!(!shared.public);
        assert_eq!(wanted.unarchived.len(), 1);
    }

    #[test]
    fn empty_catalog_wants_nothing() {
        let wanted = derive(&Catalog::default(), StoreKind::Content);
        assert!(wanted.is_empty());
        assert!(wanted.unarchived.is_empty());
    }
}
