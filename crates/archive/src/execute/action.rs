use mcarch_model::FileRef;
use mcarch_storage::StoreHandle;
use serde::{Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;

/// Where the bytes for an [`Action::Upload`] come from.
#[derive(Clone)]
pub enum UploadSource {
    /// Bytes the caller already has in hand (a local file being archived).
    Bytes(Arc<Vec<u8>>),
    /// A key in another store: propagation from one store to another, or
    /// re-keying a stale reference within the same store.
    Store { store: StoreHandle, key: String },
}

impl UploadSource {
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(Arc::new(bytes.into()))
    }

    pub fn store(store: StoreHandle, key: impl Into<String>) -> Self {
        Self::Store { store, key: key.into() }
    }
}

impl Display for UploadSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Bytes(bytes) => write!(f, "local ({} bytes)", bytes.len()),
            Self::Store { store, key } => write!(f, "{}:{key}", store.name()),
        }
    }
}

impl Debug for UploadSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "UploadSource({self})")
    }
}

impl Serialize for UploadSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A corrective action against one store.
///
/// Actions are data: the reconciler and the planning helpers produce them,
/// the [`Executor`](super::Executor) carries them out. Only an explicitly
/// confirmed prune ever produces [`DeleteOrphan`](Action::DeleteOrphan).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Archive a file's bytes. Gated on the bytes matching the file's
    /// recorded digest; success yields a metadata patch.
    Upload { file: FileRef, source: UploadSource },
    /// Ask a content network to retain an identifier.
    Pin { id: String, owners: Vec<FileRef> },
    /// Make an object-store key publicly readable, or restrict it.
    SetVisibility { key: String, public: bool, owners: Vec<FileRef> },
    /// Remove a key no file references.
    DeleteOrphan { key: String },
}

impl Action {
    fn rank(&self) -> u8 {
        match self {
            Self::Upload { .. } => 0,
            Self::Pin { .. } => 1,
            Self::SetVisibility { .. } => 2,
            Self::DeleteOrphan { .. } => 3,
        }
    }

    /// The key (or file) the action is about, for ordering and logs.
    pub fn subject(&self) -> String {
        match self {
            Self::Upload { file, .. } => file.to_string(),
            Self::Pin { id, .. } => id.clone(),
            Self::SetVisibility { key, .. } | Self::DeleteOrphan { key } => key.clone(),
        }
    }

    /// Deterministic ordering: by kind of action, then by subject.
    pub fn sort_key(&self) -> (u8, String) {
        (self.rank(), self.subject())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::Pin { .. } => "pin",
            Self::SetVisibility { .. } => "set_visibility",
            Self::DeleteOrphan { .. } => "delete_orphan",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Upload { file, source } => write!(f, "upload {file} from {source}"),
            Self::Pin { id, .. } => write!(f, "pin {id}"),
            Self::SetVisibility { key, public: true, .. } => write!(f, "make {key} public"),
            Self::SetVisibility { key, public: false, .. } => write!(f, "make {key} private"),
            Self::DeleteOrphan { key } => write!(f, "delete orphan {key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_order_by_kind_then_subject() {
        let mut actions = vec![
            Action::DeleteOrphan { key: "aa/x.jar".into() },
            Action::SetVisibility { key: "bb/y.jar".into(), public: true, owners: vec![] },
            Action::Pin { id: "QmB".into(), owners: vec![] },
            Action::Pin { id: "QmA".into(), owners: vec![] },
        ];
        actions.sort_by_key(Action::sort_key);
        let names: Vec<_> = actions.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["pin QmA", "pin QmB", "make bb/y.jar public", "delete orphan aa/x.jar"]);
    }

    #[test]
    fn upload_serializes_source_as_description() {
        let action = Action::Upload {
            file: FileRef::new("examplemod", "1.0", "examplemod-1.0.jar"),
            source: UploadSource::bytes(b"jar".to_vec()),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "upload");
        assert_eq!(json["source"], "local (3 bytes)");
        assert_eq!(json["file"]["mod"], "examplemod");
    }
}
