use crate::file::ArchiveRefs;
use crate::{File, Hash, SourceUrl};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A cataloged mod, loaded from one metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mod {
    /// Catalog identity, taken from the document's file stem (never stored
    /// inside the document itself).
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub desc: String,
    pub versions: Vec<Version>,
    /// Document fields the archive doesn't interpret (`website`, ...), kept
    /// so that writing a mod back doesn't lose them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mod {
    pub fn version(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }

    pub(crate) fn version_mut(&mut self, name: &str) -> Option<&mut Version> {
        self.versions.iter_mut().find(|v| v.name == name)
    }

    /// Every platform version supported by any release, in first-seen order.
    pub fn supported_platforms(&self) -> Vec<&str> {
        let mut platforms: Vec<&str> = Vec::new();
        for tag in self.versions.iter().flat_map(|v| v.platforms.iter()) {
            if !platforms.contains(&tag.as_str()) {
                platforms.push(tag);
            }
        }
        platforms
    }
}

/// A specific release of a mod, owning one or more files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VersionDocument")]
pub struct Version {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(rename = "mcvsn", default)]
    pub platforms: Vec<String>,
    pub files: Vec<File>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Version {
    pub fn file(&self, filename: &str) -> Option<&File> {
        self.files.iter().find(|f| f.filename == filename)
    }

    pub(crate) fn file_mut(&mut self, filename: &str) -> Option<&mut File> {
        self.files.iter_mut().find(|f| f.filename == filename)
    }
}

/// On-disk shape of a version.
///
/// Older documents describe exactly one file inline on the version
/// (`filename`, `hash`, `urls`, `archived`) instead of a `files` list. Both
/// shapes load into the same [`Version`]; writing always uses `files`. An
/// inline file needs both its `filename` and its `hash`.
#[derive(Deserialize)]
struct VersionDocument {
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    mcvsn: Vec<String>,
    #[serde(default)]
    files: Vec<File>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    hash: Option<Hash>,
    #[serde(default)]
    urls: Vec<SourceUrl>,
    // Must precede `extra`, which takes every key left over.
    #[serde(flatten)]
    archive: ArchiveRefs,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<VersionDocument> for Version {
    type Error = String;

    fn try_from(doc: VersionDocument) -> Result<Self, Self::Error> {
        let mut files = doc.files;
        match (doc.filename, doc.hash) {
            (Some(filename), Some(hash)) => files.push(File {
                filename,
                archive: doc.archive,
                hash,
                urls: doc.urls,
                extra: Map::new(),
            }),
            (Some(filename), None) => {
                return Err(format!("version {:?} names file {filename:?} without a hash", doc.name));
            },
            (None, Some(_)) => return Err(format!("version {:?} has a hash without a filename", doc.name)),
            (None, None) => {},
        }
        Ok(Self {
            name: doc.name,
            desc: doc.desc,
            platforms: doc.mcvsn,
            files,
            extra: doc.extra,
        })
    }
}
