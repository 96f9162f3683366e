use crate::wanted::Ownership;
use mcarch_model::basename;
use mcarch_storage::DirectoryEntry;
use serde::Serialize;

/// Where a file can be downloaded under its own name from a content
/// network: `{directory id}/{filename}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DirectoryLink {
    pub filename: String,
    pub digest: String,
    pub path: String,
}

/// Directory entries for one ownership record: every distinct owner file
/// name, pointing at the shared identifier.
pub(crate) fn entries(id: &str, ownership: &Ownership) -> Vec<DirectoryEntry> {
    let mut names: Vec<&str> = ownership.owners.iter().map(|owner| basename(&owner.file)).collect();
    names.sort_unstable();
    names.dedup();
    names.into_iter().map(|name| DirectoryEntry::new(name, id)).collect()
}

/// The links a synthesized directory provides.
pub(crate) fn links(directory: &str, ownership: &Ownership, entries: &[DirectoryEntry]) -> Vec<DirectoryLink> {
    entries
        .iter()
        .map(|entry| DirectoryLink {
            filename: entry.name.clone(),
            digest: ownership.digest.clone(),
            path: format!("{directory}/{}", entry.name),
        })
        .collect()
}
