//! Layered configuration for mcarch.
//!
//! Sources are merged in order, later ones winning:
//!
//! 1. built-in defaults,
//! 2. a YAML, TOML or JSON file (an explicit path, or `config.toml` in the
//!    platform config directory if it exists),
//! 3. environment variables prefixed `MCARCH_`, with `__` separating nested
//!    keys (`MCARCH_STORES__B2__BUCKET=mods`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use mcarch_model::StoreKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "MCARCH_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one `<mod id>.json` document per mod.
    pub metadata: PathBuf,
    /// Revision to stamp the loaded snapshot with, e.g. a commit hash.
    pub revision: Option<String>,
    /// Maximum action groups executed at once, per store.
    pub concurrency: usize,
    /// Upper bound on any single store call.
    pub timeout_secs: u64,
    /// Retries per action after the first attempt.
    pub retries: usize,
    /// Report what would be done without writing to any store or document.
    pub dry_run: bool,
    pub stores: BTreeMap<String, StoreConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata: PathBuf::from("mods"),
            revision: None,
            concurrency: 8,
            timeout_secs: 30,
            retries: 3,
            dry_run: false,
            stores: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    S3(S3Config),
    Ipfs(IpfsConfig),
}

impl StoreConfig {
    pub fn kind(&self) -> StoreKind {
        match self {
            Self::S3(_) => StoreKind::Object,
            Self::Ipfs(_) => StoreKind::Content,
        }
    }

    /// Public base URL files in this store are downloaded from, if any.
    pub fn public_url(&self) -> Option<&str> {
        match self {
            Self::S3(s3) => s3.public_url.as_deref(),
            Self::Ipfs(ipfs) => ipfs.gateway.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible providers.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    #[serde(default)]
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsConfig {
    /// Kubo RPC endpoint.
    #[serde(default = "default_ipfs_api")]
    pub api: String,
    #[serde(default)]
    pub gateway: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_ipfs_api() -> String {
    "http://127.0.0.1:5001".to_string()
}

impl Config {
    /// Where the config file lives when no path is given.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mcarch").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The merged sources, before extraction.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = Self::default_path().filter(|p| p.is_file()) {
                    figment = merge_file(figment, &path)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(stores = config.stores.len(), metadata = %config.metadata.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("concurrency must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("timeout_secs must be at least 1".into()));
        }
        let mut kinds = BTreeMap::new();
        for (name, store) in &self.stores {
            match store {
                StoreConfig::S3(s3) if s3.bucket.is_empty() => {
                    exn::bail!(ErrorKind::Invalid(format!("store {name}: bucket is empty")));
                },
                StoreConfig::Ipfs(ipfs) if ipfs.api.is_empty() => {
                    exn::bail!(ErrorKind::Invalid(format!("store {name}: api is empty")));
                },
                _ => {},
            }
            // Each store kind owns one metadata field, so two stores of a kind
            // would fight over it.
            if let Some(other) = kinds.insert(store.kind(), name) {
                exn::bail!(ErrorKind::Invalid(format!(
                    "stores {other} and {name} are both {} stores",
                    store.kind()
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnknownFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn s3(bucket: &str) -> StoreConfig {
        StoreConfig::S3(S3Config {
            bucket: bucket.into(),
            prefix: None,
            region: default_region(),
            endpoint: None,
            key_id: "id".into(),
            key_secret: "secret".into(),
            public_url: None,
        })
    }

    fn ipfs() -> StoreConfig {
        StoreConfig::Ipfs(IpfsConfig { api: default_ipfs_api(), gateway: None })
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "mcarch.toml",
                r#"
                metadata = "/srv/mods"
                concurrency = 4

                [stores.b2]
                type = "s3"
                bucket = "mods"
                endpoint = "https://s3.us-west-004.backblazeb2.com"
                key_id = "id"
                key_secret = "secret"
                public_url = "https://files.example.org"

                [stores.ipfs]
                type = "ipfs"
                "#,
            )?;
            jail.set_env("MCARCH_CONCURRENCY", "2");
            jail.set_env("MCARCH_STORES__B2__PREFIX", "archive");

            let config = Config::load(Some(Path::new("mcarch.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.metadata, PathBuf::from("/srv/mods"));
            assert_eq!(config.concurrency, 2);
            assert_eq!(config.retries, 3);
            let StoreConfig::S3(b2) = &config.stores["b2"] else { panic!("b2 is not s3") };
            assert_eq!(b2.prefix.as_deref(), Some("archive"));
            assert_eq!(b2.region, "us-east-1");
            assert_eq!(config.stores["b2"].public_url(), Some("https://files.example.org"));
            assert_eq!(config.stores["ipfs"], ipfs());
            Ok(())
        });
    }

    #[test]
    fn yaml_is_accepted() {
        Jail::expect_with(|jail| {
            jail.create_file("mcarch.yml", "dry_run: true\ntimeout_secs: 5\n")?;
            let config = Config::load(Some(Path::new("mcarch.yml"))).map_err(|e| e.to_string())?;
            assert!(config.dry_run);
            assert_eq!(config.timeout(), Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn explicit_file_must_exist() {
        Jail::expect_with(|_| {
            let err = Config::load(Some(Path::new("missing.toml"))).unwrap_err();
            assert_eq!(*err, ErrorKind::NotFound(PathBuf::from("missing.toml")));
            Ok(())
        });
    }

    #[test]
    fn unknown_extension_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("mcarch.ini", "concurrency = 1")?;
            let err = Config::load(Some(Path::new("mcarch.ini"))).unwrap_err();
            assert!(matches!(*err, ErrorKind::UnknownFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn malformed_store_fails_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file("mcarch.json", r#"{"stores": {"b2": {"type": "ftp"}}}"#)?;
            let err = Config::load(Some(Path::new("mcarch.json"))).unwrap_err();
            assert_eq!(*err, ErrorKind::Load);
            Ok(())
        });
    }

    #[rstest]
    #[case::no_concurrency(Config { concurrency: 0, ..Config::default() })]
    #[case::no_timeout(Config { timeout_secs: 0, ..Config::default() })]
    #[case::empty_bucket(Config { stores: [("b2".to_string(), s3(""))].into(), ..Config::default() })]
    #[case::two_object_stores(Config {
        stores: [("b2".to_string(), s3("a")), ("r2".to_string(), s3("b"))].into(),
        ..Config::default()
    })]
    fn invalid(#[case] config: Config) {
        assert!(matches!(*config.validate().unwrap_err(), ErrorKind::Invalid(_)));
    }

    #[test]
    fn one_store_of_each_kind_is_valid() {
        let config = Config { stores: [("b2".to_string(), s3("mods")), ("ipfs".to_string(), ipfs())].into(), ..Config::default() };
        assert!(config.validate().is_ok());
    }
}
