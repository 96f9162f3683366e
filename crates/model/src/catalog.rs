//! Catalog snapshots and the JSON documents they are loaded from.
//!
//! A metadata repository keeps one `<mod id>.json` document per mod. Loading
//! validates what the archive relies on (non-empty digests and filenames,
//! unique version and file names) so that nothing downstream has to.

use crate::error::{ErrorKind, Result};
use crate::{File, FileRef, Mod, Patch, basename};
use exn::{OptionExt, ResultExt};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::instrument;

/// An immutable snapshot of every mod in the metadata repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    /// Opaque revision of the metadata this snapshot was loaded from (e.g. a
    /// commit hash), if known.
    pub revision: Option<String>,
    mods: BTreeMap<String, Mod>,
}

impl Catalog {
    /// Builds a catalog from already-loaded mods, keyed by their id.
    pub fn new(mods: impl IntoIterator<Item = Mod>) -> Self {
        Self {
            revision: None,
            mods: mods.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Loads every `*.json` document in `dir`.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).or_raise(|| ErrorKind::Io(dir.to_path_buf()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.or_raise(|| ErrorKind::Io(dir.to_path_buf()))?.path();
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                paths.push(path);
            }
        }
        // Directory order is filesystem-dependent.
        paths.sort();
        let mods = paths.iter().map(load_mod).collect::<Result<Vec<_>>>()?;
        tracing::debug!(mods = mods.len(), "Loaded metadata catalog");
        Ok(Self::new(mods))
    }

    pub fn mods(&self) -> impl Iterator<Item = &Mod> {
        self.mods.values()
    }

    pub fn get(&self, id: &str) -> Option<&Mod> {
        self.mods.get(id)
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// Every file in the catalog with its address, in mod/version/file order.
    pub fn files(&self) -> impl Iterator<Item = (FileRef, &File)> {
        self.mods.values().flat_map(|m| {
            m.versions.iter().flat_map(move |v| {
                v.files.iter().map(move |f| (FileRef::new(&m.id, &v.name, &f.filename), f))
            })
        })
    }

    pub fn file(&self, file: &FileRef) -> Option<&File> {
        self.mods.get(&file.mod_id)?.version(&file.version)?.file(&file.file)
    }

    /// Files whose name matches the basename of `name`, optionally limited to
    /// one mod.
    pub fn find_by_filename<'a>(
        &'a self,
        mod_id: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = (FileRef, &'a File)> + 'a {
        let name = basename(name);
        self.files()
            .filter(move |(r, _)| mod_id.is_none_or(|id| r.mod_id == id))
            .filter(move |(_, f)| f.filename == name)
    }

    /// Returns a new snapshot with `patches` applied in order.
    ///
    /// Fails with [`ErrorKind::MetadataInconsistent`] if any patch addresses a
    /// file that doesn't exist; the original snapshot is left untouched.
    pub fn apply<'a>(&self, patches: impl IntoIterator<Item = &'a Patch>) -> Result<Self> {
        let mut next = self.clone();
        for patch in patches {
            let file = next
                .mods
                .get_mut(&patch.file.mod_id)
                .and_then(|m| m.version_mut(&patch.file.version))
                .and_then(|v| v.file_mut(&patch.file.file))
                .ok_or_raise(|| ErrorKind::MetadataInconsistent(patch.file.clone()))?;
            file.archive.set(patch.field.store_kind(), patch.value.clone());
        }
        Ok(next)
    }
}

/// Loads a single mod document. The mod id is the document's file stem.
pub fn load_mod(path: impl AsRef<Path>) -> Result<Mod> {
    let path = path.as_ref();
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_raise(|| ErrorKind::Invalid { path: path.to_path_buf(), reason: "no usable file name".into() })?;
    let contents = fs::read_to_string(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    let mut m: Mod = serde_json::from_str(&contents).or_raise(|| ErrorKind::Malformed(path.to_path_buf()))?;
    m.id = id;
    validate(&m).map_err(|reason| ErrorKind::Invalid { path: path.to_path_buf(), reason })?;
    Ok(m)
}

/// Writes a mod document back to disk.
///
/// Output is deterministic (field order follows the model, two-space
/// indentation, trailing newline) so that re-writing an unchanged mod is a
/// no-op in version control.
pub fn write_mod(path: impl AsRef<Path>, m: &Mod) -> Result<()> {
    let path = path.as_ref();
    let mut json = serde_json::to_string_pretty(m).or_raise(|| ErrorKind::Malformed(path.to_path_buf()))?;
    json.push('\n');
    fs::write(path, json).or_raise(|| ErrorKind::Io(path.to_path_buf()))
}

fn validate(m: &Mod) -> std::result::Result<(), String> {
    let mut versions = HashSet::new();
    for version in &m.versions {
        if !versions.insert(version.name.as_str()) {
            return Err(format!("duplicate version {:?}", version.name));
        }
        let mut files = HashSet::new();
        for file in &version.files {
            if file.filename.trim().is_empty() {
                return Err(format!("version {:?} has a file without a filename", version.name));
            }
            if file.hash.digest.trim().is_empty() {
                return Err(format!("{:?} in version {:?} has an empty digest", file.filename, version.name));
            }
            if !files.insert(file.filename.as_str()) {
                return Err(format!("duplicate file {:?} in version {:?}", file.filename, version.name));
            }
        }
    }
    Ok(())
}
