//! Metadata model for the mod archive.
//!
//! A [`Catalog`] is an immutable snapshot of every [`Mod`] in the metadata
//! repository. Each mod owns [`Version`]s, each version owns [`File`]s, and
//! each file carries the [`Hash`] that keys its archived bytes plus an
//! optional reference per [`StoreKind`] recording where it was archived.
//!
//! Nothing in this crate talks to a store. Archiving produces [`Patch`]es
//! that are applied to a catalog with [`Catalog::apply`], which returns a new
//! snapshot instead of mutating the old one.

mod catalog;
pub mod error;
mod file;
mod hash;
mod kind;
mod mods;
mod patch;
mod url;

pub use crate::catalog::{Catalog, load_mod, write_mod};
pub use crate::file::{ArchiveRefs, File, FileRef, basename, object_key};
pub use crate::hash::{Hash, HashAlgorithm};
pub use crate::kind::StoreKind;
pub use crate::mods::{Mod, Version};
pub use crate::patch::{Patch, PatchField};
pub use crate::url::{SourceUrl, UrlKind};
