use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// What a source URL points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UrlKind {
    /// Direct official download.
    Original,
    /// Official download page; the bytes must not be publicly mirrored.
    Page,
    /// Copy held in the object store.
    Archived,
    /// Copy held in the content network.
    Ipfs,
    Other(String),
}

impl UrlKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Original => "original",
            Self::Page => "page",
            Self::Archived => "archived",
            Self::Ipfs => "ipfs",
            Self::Other(s) => s,
        }
    }

    /// Human readable label for download links.
    pub fn label(&self) -> &str {
        match self {
            Self::Original => "Official Download",
            Self::Page => "Official Download Page",
            Self::Archived => "Archived File",
            Self::Ipfs => "IPFS Download",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for UrlKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "original" => Self::Original,
            "page" => Self::Page,
            "archived" => Self::Archived,
            "ipfs" => Self::Ipfs,
            _ => Self::Other(s),
        }
    }
}

impl From<UrlKind> for String {
    fn from(kind: UrlKind) -> Self {
        kind.as_str().to_string()
    }
}

impl Display for UrlKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A URL the file can be obtained from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUrl {
    #[serde(rename = "type")]
    pub kind: UrlKind,
    pub url: String,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceUrl {
    pub fn new(kind: UrlKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            desc: None,
            extra: Map::new(),
        }
    }
}

/// Documents write `""` for "no value"; treat it as absent.
pub(crate) fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
