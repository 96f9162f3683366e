use crate::url::empty_as_none;
use crate::{Hash, SourceUrl, StoreKind, UrlKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Derives the object-store key for a file: `{digest}/{basename(filename)}`.
///
/// The digest is the identity; the filename only contributes a human-readable
/// suffix. Any directory components in the filename are dropped, so the key
/// can always be regenerated from `(digest, filename)` alone.
///
/// ```
/// use mcarch_model::object_key;
/// assert_eq!(object_key("abcd1234", "examplemod-1.0.jar"), "abcd1234/examplemod-1.0.jar");
/// assert_eq!(object_key("abcd1234", "builds/examplemod-1.0.jar"), "abcd1234/examplemod-1.0.jar");
/// ```
pub fn object_key(digest: &str, filename: &str) -> String {
    format!("{digest}/{}", basename(filename))
}

/// The last path component of `filename`.
///
/// ```
/// use mcarch_model::basename;
/// assert_eq!(basename("C:\\mods\\examplemod-1.0.jar"), "examplemod-1.0.jar");
/// assert_eq!(basename("builds/examplemod-1.0.jar"), "examplemod-1.0.jar");
/// ```
pub fn basename(filename: &str) -> &str {
    // Documents are authored on every platform; accept either separator.
    filename.rsplit(['/', '\\']).find(|s| !s.is_empty()).unwrap_or(filename)
}

/// Where a file has been archived, one optional reference per store kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRefs {
    /// Object-store key (`archived` in documents).
    #[serde(rename = "archived", default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Content-network identifier (`ipfs` in documents).
    #[serde(rename = "ipfs", default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ArchiveRefs {
    pub fn get(&self, kind: StoreKind) -> Option<&str> {
        match kind {
            StoreKind::Object => self.object.as_deref(),
            StoreKind::Content => self.content.as_deref(),
        }
    }

    pub fn set(&mut self, kind: StoreKind, value: impl Into<String>) {
        let value = Some(value.into());
        match kind {
            StoreKind::Object => self.object = value,
            StoreKind::Content => self.content = value,
        }
    }
}

/// A single downloadable artifact belonging to a [`Version`](crate::Version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub filename: String,
    #[serde(flatten)]
    pub archive: ArchiveRefs,
    pub hash: Hash,
    #[serde(default)]
    pub urls: Vec<SourceUrl>,
    // Declared after `archive` so the flattened refs take their keys first.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl File {
    pub fn new(filename: impl Into<String>, hash: Hash) -> Self {
        Self {
            filename: filename.into(),
            archive: ArchiveRefs::default(),
            hash,
            urls: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_url(mut self, url: SourceUrl) -> Self {
        self.urls.push(url);
        self
    }

    pub fn with_archive(mut self, kind: StoreKind, reference: impl Into<String>) -> Self {
        self.archive.set(kind, reference);
        self
    }

    /// The key this file's bytes belong under in an object store.
    pub fn object_key(&self) -> String {
        object_key(&self.hash.digest, &self.filename)
    }

    /// Whether our archived copy may be publicly available.
    ///
    /// A `page` URL means the official download requires visiting a page, so
    /// the bytes are listed but never publicly mirrored.
    pub fn is_public(&self) -> bool {
        !self.urls.iter().any(|u| u.kind == UrlKind::Page)
    }

    pub fn is_archived(&self, kind: StoreKind) -> bool {
        self.archive.get(kind).is_some()
    }

    /// The URL advertising our copy in `kind`, if one may be shown.
    ///
    /// Exists only when the file is archived in that store, public, has no
    /// official (`original`/`page`) URL, and doesn't already list a URL of the
    /// store's own kind. `base` is the public base URL of the store; `path`
    /// overrides the stored reference (content networks serve files through
    /// synthesized directories so the download keeps its name).
    pub fn derived_url(&self, kind: StoreKind, base: &str, path: Option<&str>) -> Option<SourceUrl> {
        let reference = self.archive.get(kind)?;
        if !self.is_public() {
            return None;
        }
        let url_kind = kind.url_kind();
        if self.urls.iter().any(|u| matches!(u.kind, UrlKind::Original | UrlKind::Page) || u.kind == url_kind) {
            return None;
        }
        let url = format!("{}/{}", base.trim_end_matches('/'), path.unwrap_or(reference).trim_start_matches('/'));
        Some(SourceUrl::new(url_kind, url))
    }

    /// The publicly visible URL list: stored URLs followed by at most one
    /// synthesized URL per store kind.
    pub fn visible_urls(&self, bases: &[(StoreKind, &str)], content_path: Option<&str>) -> Vec<SourceUrl> {
        let mut urls = self.urls.clone();
        for kind in [StoreKind::Object, StoreKind::Content] {
            let Some((_, base)) = bases.iter().find(|(k, _)| *k == kind) else {
                continue;
            };
            let path = match kind {
                StoreKind::Content => content_path,
                StoreKind::Object => None,
            };
            urls.extend(self.derived_url(kind, base, path));
        }
        urls
    }
}

/// Address of a file within a catalog: `(mod id, version name, file name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(rename = "mod")]
    pub mod_id: String,
    pub version: String,
    pub file: String,
}

impl FileRef {
    pub fn new(mod_id: impl Into<String>, version: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            version: version.into(),
            file: file.into(),
        }
    }
}

impl Display for FileRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}@{}/{}", self.mod_id, self.version, self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const S3: &str = "https://files.example.net";
    const GATEWAY: &str = "https://gateway.example.net/ipfs/";

    fn jar() -> File {
        File::new("examplemod-1.0.jar", Hash::sha256("abcd1234"))
    }

    #[rstest]
    #[case("abcd1234", "examplemod-1.0.jar", "abcd1234/examplemod-1.0.jar")]
    #[case("abcd1234", "some/dir/examplemod-1.0.jar", "abcd1234/examplemod-1.0.jar")]
    #[case("abcd1234", "C:\\mods\\examplemod-1.0.jar", "abcd1234/examplemod-1.0.jar")]
    #[case("ABCD1234", "trailing/", "ABCD1234/trailing")]
    fn test_object_key(#[case] digest: &str, #[case] filename: &str, #[case] expected: &str) {
        assert_eq!(object_key(digest, filename), expected);
    }

    #[test]
    fn test_object_key_round_trip() {
        let file = jar();
        let key = file.object_key();
        assert_eq!(key, format!("{}/{}", file.hash.digest, file.filename));
        assert_eq!(key, object_key(&file.hash.digest, &file.filename));
    }

    #[test]
    fn test_page_url_makes_file_private() {
        assert!(jar().is_public());
        let file = jar()
            .with_url(SourceUrl::new(UrlKind::Original, "https://example.net/dl"))
            .with_url(SourceUrl::new(UrlKind::Page, "https://example.net/page"));
        assert!(!file.is_public());
    }

    #[test]
    fn test_derived_url_requires_archive() {
        assert_eq!(jar().derived_url(StoreKind::Object, S3, None), None);
        let file = jar().with_archive(StoreKind::Object, "abcd1234/examplemod-1.0.jar");
        assert_eq!(
            file.derived_url(StoreKind::Object, S3, None).unwrap().url,
            "https://files.example.net/abcd1234/examplemod-1.0.jar"
        );
    }

    #[rstest]
    #[case(UrlKind::Page)]
    #[case(UrlKind::Original)]
    #[case(UrlKind::Archived)]
    fn test_derived_url_suppressed(#[case] kind: UrlKind) {
        let file = jar()
            .with_archive(StoreKind::Object, "abcd1234/examplemod-1.0.jar")
            .with_url(SourceUrl::new(kind, "https://example.net/x"));
        assert_eq!(file.derived_url(StoreKind::Object, S3, None), None);
    }

    #[test]
    fn test_visible_urls_adds_one_per_store() {
        let file = jar()
            .with_archive(StoreKind::Object, "abcd1234/examplemod-1.0.jar")
            .with_archive(StoreKind::Content, "QmExample")
            .with_url(SourceUrl::new(UrlKind::Other("mirror".into()), "https://mirror.example.net/x.jar"));
        let urls = file.visible_urls(&[(StoreKind::Object, S3), (StoreKind::Content, GATEWAY)], Some("QmDir/examplemod-1.0.jar"));
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0].kind, UrlKind::Other("mirror".into()));
        assert_eq!(urls[1].kind, UrlKind::Archived);
        assert_eq!(urls[2].url, "https://gateway.example.net/ipfs/QmDir/examplemod-1.0.jar");
    }

    #[test]
    fn test_visible_urls_private_file_is_projection_only() {
        let file = jar()
            .with_archive(StoreKind::Object, "abcd1234/examplemod-1.0.jar")
            .with_archive(StoreKind::Content, "QmExample")
            .with_url(SourceUrl::new(UrlKind::Page, "https://example.net/page"));
        let urls = file.visible_urls(&[(StoreKind::Object, S3), (StoreKind::Content, GATEWAY)], None);
        assert_eq!(urls, file.urls);
    }

    #[test]
    fn test_empty_archive_refs_deserialize_as_absent() {
        let file: File = serde_json::from_str(
            r#"{"filename":"a.jar","archived":"","ipfs":"QmX","hash":{"type":"sha256","digest":"ff"}}"#,
        )
        .unwrap();
        assert_eq!(file.archive.object, None);
        assert_eq!(file.archive.content.as_deref(), Some("QmX"));
        assert!(file.urls.is_empty());
    }
}
