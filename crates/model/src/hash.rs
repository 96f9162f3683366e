use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Hash algorithm declared by a metadata document.
///
/// Every document written so far uses `sha256`. Unknown names are kept
/// verbatim so that rewriting a document never loses them, but bytes can't
/// be verified against them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
    Unknown(String),
}

impl HashAlgorithm {
    /// Computes the lowercase hex digest of `bytes`, or `None` if the
    /// algorithm isn't one we know how to compute.
    pub fn digest(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Sha256 => Some(format!("{:x}", Sha256::digest(bytes))),
            Self::Blake3 => Some(blake3::hash(bytes).to_hex().to_string()),
            Self::Unknown(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for HashAlgorithm {
    fn from(name: String) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha256" => Self::Sha256,
            "blake3" => Self::Blake3,
            _ => Self::Unknown(name),
        }
    }
}

impl From<HashAlgorithm> for String {
    fn from(algorithm: HashAlgorithm) -> Self {
        algorithm.as_str().to_string()
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A file's declared hash. The digest is the file's archive identity and is
/// compared byte-for-byte (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash {
    #[serde(rename = "type", default)]
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl Hash {
    pub fn new(algorithm: HashAlgorithm, digest: impl Into<String>) -> Self {
        Self { algorithm, digest: digest.into() }
    }

    pub fn sha256(digest: impl Into<String>) -> Self {
        Self::new(HashAlgorithm::Sha256, digest)
    }

    /// Hashes `bytes` with SHA-256, the algorithm new documents declare.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        // Infallible: sha256 is always computable.
        Self::sha256(HashAlgorithm::Sha256.digest(bytes).unwrap_or_default())
    }

    /// Returns `true` only when `bytes` hash to exactly this digest.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.algorithm.digest(bytes).is_some_and(|actual| actual == self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sha256", HashAlgorithm::Sha256)]
    #[case("SHA256", HashAlgorithm::Sha256)]
    #[case("blake3", HashAlgorithm::Blake3)]
    #[case("md5", HashAlgorithm::Unknown("md5".to_string()))]
    fn test_algorithm_from_name(#[case] name: &str, #[case] expected: HashAlgorithm) {
        assert_eq!(HashAlgorithm::from(name.to_string()), expected);
    }

    #[test]
    fn test_sha256_digest() {
        // Well-known digest of the empty input.
        assert_eq!(
            HashAlgorithm::Sha256.digest(b"").unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_matches_is_case_sensitive() {
        let hash = Hash::of_bytes(b"hello");
        assert!(hash.matches(b"hello"));
        assert!(!hash.matches(b"hello!"));
        let shouting = Hash::sha256(hash.digest.to_uppercase());
        assert!(!shouting.matches(b"hello"));
    }

    #[test]
    fn test_unknown_algorithm_never_matches() {
        let hash = Hash::new(HashAlgorithm::Unknown("md5".into()), "5d41402abc4b2a76b9719d911017c592");
        assert!(!hash.matches(b"hello"));
    }

    #[test]
    fn test_serde_uses_type_field() {
        let hash: Hash = serde_json::from_str(r#"{"type":"sha256","digest":"abcd1234"}"#).unwrap();
        assert_eq!(hash, Hash::sha256("abcd1234"));
        assert_eq!(serde_json::to_string(&hash).unwrap(), r#"{"type":"sha256","digest":"abcd1234"}"#);
    }
}
