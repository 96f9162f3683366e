use crate::{PatchField, UrlKind};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The two families of content store an archived file can live in.
///
/// The kind decides how a file is keyed in the store: object stores use a
/// key derived from the file's digest and name, content networks use the
/// identifier the network assigned when the bytes were added.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Flat key→bytes store with access control (S3 and friends).
    #[display("object")]
    Object,
    /// Content-addressed, pin-based network (IPFS and friends).
    #[display("content")]
    Content,
}

impl StoreKind {
    /// Metadata field that records a file's reference in this kind of store.
    pub fn patch_field(self) -> PatchField {
        match self {
            Self::Object => PatchField::Archived,
            Self::Content => PatchField::Ipfs,
        }
    }

    /// Source URL kind used when advertising a copy held in this kind of store.
    pub fn url_kind(self) -> UrlKind {
        match self {
            Self::Object => UrlKind::Archived,
            Self::Content => UrlKind::Ipfs,
        }
    }
}
