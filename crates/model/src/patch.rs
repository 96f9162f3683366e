use crate::{FileRef, StoreKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};

/// Metadata field a [`Patch`] writes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchField {
    /// Object-store key of the archived copy.
    #[display("archived")]
    Archived,
    /// Content-network identifier of the archived copy.
    #[display("ipfs")]
    Ipfs,
}

impl PatchField {
    pub fn store_kind(self) -> StoreKind {
        match self {
            Self::Archived => StoreKind::Object,
            Self::Ipfs => StoreKind::Content,
        }
    }
}

/// A data-level edit to one file's metadata: `(mod id, version name, file
/// name, field, value)`.
///
/// Archiving never touches metadata documents directly; it emits patches
/// and leaves applying (and committing) them to whoever owns the documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patch {
    #[serde(flatten)]
    pub file: FileRef,
    pub field: PatchField,
    pub value: String,
}

impl Patch {
    pub fn new(file: FileRef, field: PatchField, value: impl Into<String>) -> Self {
        Self { file, field, value: value.into() }
    }
}

impl FmtDisplay for Patch {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "({}, {}, {}, {}, {:?})",
            self.file.mod_id, self.file.version, self.file.file, self.field, self.value
        )
    }
}
