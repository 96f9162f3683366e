//! Turning store configuration into live store handles.

use crate::error::{ErrorKind, Result};
use mcarch_config::{Config, StoreConfig};
use mcarch_model::StoreKind;
use mcarch_storage::StoreHandle;
use mcarch_storage::backend::{ReadOnlyStore, TimeoutStore};
use std::sync::Arc;

/// Open every configured store, bounded by the configured timeout and, in a
/// dry run, stripped of its ability to write.
pub fn open_all(config: &Config) -> Result<Vec<StoreHandle>> {
    config
        .stores
        .iter()
        .map(|(name, store)| {
            let handle: StoreHandle = Arc::new(TimeoutStore::new(open(name, store)?, config.timeout()));
            Ok(match config.dry_run {
                true => Arc::new(ReadOnlyStore::new(handle)) as StoreHandle,
                false => handle,
            })
        })
        .collect()
}

#[allow(unused_variables)]
fn open(name: &str, store: &StoreConfig) -> Result<StoreHandle> {
    match store {
        #[cfg(feature = "s3")]
        StoreConfig::S3(s3) => {
            use exn::ResultExt;
            let store = mcarch_storage::backend::S3Store::new(
                name,
                &s3.bucket,
                s3.prefix.clone(),
                &s3.region,
                s3.endpoint.clone(),
                &s3.key_id,
                &s3.key_secret,
            )
            .or_raise(|| ErrorKind::Store(name.to_string()))?;
            Ok(Arc::new(store))
        },
        #[cfg(feature = "ipfs")]
        StoreConfig::Ipfs(ipfs) => Ok(Arc::new(mcarch_storage::backend::IpfsStore::new(name, &ipfs.api))),
        #[allow(unreachable_patterns)]
        other => exn::bail!(ErrorKind::Store(format!("{name}: {} support was not compiled in", other.kind()))),
    }
}

/// Pick stores by name, or every store when no name is given, optionally
/// keeping only one kind.
pub fn select(stores: &[StoreHandle], name: Option<&str>, kind: Option<StoreKind>) -> Result<Vec<StoreHandle>> {
    let selected: Vec<StoreHandle> = stores
        .iter()
        .filter(|s| name.is_none_or(|n| s.name() == n))
        .filter(|s| kind.is_none_or(|k| s.kind() == k))
        .cloned()
        .collect();
    if selected.is_empty() {
        let wanted = match (name, kind) {
            (Some(name), Some(kind)) => format!("no {kind} store named {name}"),
            (Some(name), None) => format!("no store named {name}"),
            (None, Some(kind)) => format!("no {kind} store configured"),
            (None, None) => "no stores configured".to_string(),
        };
        exn::bail!(ErrorKind::Store(wanted));
    }
    Ok(selected)
}

/// Exactly one store by name.
pub fn one(stores: &[StoreHandle], name: &str) -> Result<StoreHandle> {
    let mut selected = select(stores, Some(name), None)?;
    match selected.len() {
        1 => Ok(selected.remove(0)),
        _ => exn::bail!(ErrorKind::Store(format!("{name} is configured more than once"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcarch_storage::backend::MockStore;

    fn mocks() -> Vec<StoreHandle> {
        vec![
            Arc::new(MockStore::object().with_name("b2")),
            Arc::new(MockStore::content().with_name("ipfs")),
        ]
    }

    #[test]
    fn select_by_name_and_kind() {
        let stores = mocks();
        assert_eq!(select(&stores, None, None).unwrap().len(), 2);
        assert_eq!(select(&stores, None, Some(StoreKind::Content)).unwrap()[0].name(), "ipfs");
        assert_eq!(one(&stores, "b2").unwrap().kind(), StoreKind::Object);
        assert!(select(&stores, Some("b2"), Some(StoreKind::Content)).is_err());
        assert!(one(&stores, "r2").is_err());
    }

    #[cfg(feature = "ipfs")]
    #[tokio::test]
    async fn dry_run_stores_are_read_only() {
        use mcarch_config::IpfsConfig;

        let mut config = Config { dry_run: true, ..Config::default() };
        config.stores.insert(
            "ipfs".into(),
            StoreConfig::Ipfs(IpfsConfig { api: "http://127.0.0.1:9".into(), gateway: None }),
        );
        let stores = open_all(&config).unwrap();
        assert_eq!(stores[0].name(), "ipfs");
        assert_eq!(stores[0].kind(), StoreKind::Content);
        // Nothing is listening on the discard port; a read-only store never
        // tries.
        assert!(stores[0].delete("QmA").await.is_ok());
    }
}
