//! S3-compatible object store.
//!
//! This module provides a content store implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), MinIO and
//! others. Files are keyed `{digest}/{filename}` under an optional prefix, and
//! visibility maps onto the canned `public-read` / `private` object ACLs.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file. Each
//! store specifies its own `key_id` and `key_secret`.
//!
//! TODO: support `credentials: "profile:name"` in config to use AWS SDK
//! credential providers (~/.aws/credentials profiles) instead of explicit keys.

use super::{Ack, KeyStream};
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::{ContentStore, StoreKind};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, retry::RetryConfig};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, Permission};
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Generous default for concurrent S3 requests.
///
/// TODO: Adaptive rate limiting based on 429/throttling responses?
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// Grantee URI S3 uses for "everyone, unauthenticated".
const ALL_USERS: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// S3-compatible object store.
///
/// Stores files in an S3 bucket, optionally under a key prefix. All keys are
/// relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use mcarch_storage::backend::S3Store;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = S3Store::new(
///     "b2",
///     "mcarchive",
///     Some("archive".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com"),
///     "access_key_id",
///     "secret_access_key",
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Store {
    /// Create a new S3 object store.
    ///
    /// # Arguments
    /// * `name` - A name for this store (used in reports/logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let credentials = Credentials::new(key_id, key_secret, None, None, "mcarch-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // The SDK's own retries cover a single request (1 initial + 3
            // retries); the executor's backoff covers whole actions.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(name, Client::from_conf(config_builder.build()), bucket, prefix)
    }

    /// Wrap an already-configured client.
    pub fn from_client(
        name: impl Into<String>,
        client: Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(validate_key).transpose()?;
        Ok(Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a store key.
    fn full_key(&self, key: &str) -> Result<String> {
        let validated = validate_key(key)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{validated}"),
            None => validated,
        })
    }

    /// Strip the configured prefix from an S3 key to get the store key.
    fn relative_key<'k>(&self, key: &'k str) -> &'k str {
        match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).and_then(|s| s.strip_prefix('/')).unwrap_or(key),
            None => key,
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<SemaphorePermit<'_>> {
        self.rate_limiter
            .acquire()
            .await
            .or_raise(|| ErrorKind::BackendError(format!("{} rate limiter closed", self.name)))
    }
}

/// Sort an SDK failure into the two kinds callers act on.
///
/// Transport-level failures (timeouts, connection errors, unparseable
/// responses) are transient. Service errors are classified by HTTP status.
fn classify<E>(err: &SdkError<E, HttpResponse>, key: &str) -> ErrorKind
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("{key}: {}", DisplayErrorContext(err));
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ErrorKind::Unavailable(message)
        },
        _ => match err.raw_response().map(|response| response.status().as_u16()) {
            Some(404) => ErrorKind::NotFound(key.to_string()),
            Some(401 | 403) => ErrorKind::PermissionDenied(message),
            Some(429 | 500..=599) => ErrorKind::Unavailable(message),
            _ => ErrorKind::BackendError(message),
        },
    }
}

#[async_trait]
impl ContentStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Object
    }

    #[tracing::instrument(level = "debug", skip(self, data), fields(store = %self.name, bytes = data.len()))]
    async fn put(&self, key: &str, data: &[u8]) -> Result<Ack> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| exn::Exn::from(classify(&e, key)))?;
        Ok(Ack { key: self.relative_key(&full_key).to_string() })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let output = self.client.get_object().bucket(&self.bucket).key(&full_key).send().await.map_err(|e| {
            match e.as_service_error().is_some_and(|service| service.is_no_such_key()) {
                true => exn::Exn::from(ErrorKind::NotFound(key.to_string())),
                false => exn::Exn::from(classify(&e, key)),
            }
        })?;
        let body = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Unavailable(format!("{key}: body interrupted")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&full_key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|service| service.is_not_found()) => Ok(false),
            Err(e) => match classify(&e, key) {
                ErrorKind::NotFound(_) => Ok(false),
                kind => Err(exn::Exn::from(kind)),
            },
        }
    }

    fn list_keys<'a>(&'a self) -> KeyStream<'a> {
        Box::pin(stream! {
            let mut continuation: Option<String> = None;
            loop {
                let page = {
                    let _permit = match self.acquire_permit().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            yield Err(e);
                            return;
                        },
                    };
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .set_prefix(self.prefix.as_ref().map(|prefix| format!("{prefix}/")))
                        .set_continuation_token(continuation.take())
                        .send()
                        .await
                };
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(exn::Exn::from(classify(&e, &self.bucket)));
                        return;
                    },
                };
                for object in page.contents() {
                    if let Some(key) = object.key() {
                        yield Ok(self.relative_key(key).to_string());
                    }
                }
                match (page.is_truncated(), page.next_continuation_token()) {
                    (Some(true), Some(token)) => continuation = Some(token.to_string()),
                    _ => break,
                }
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        // DeleteObject succeeds for keys that don't exist.
        match self.client.delete_object().bucket(&self.bucket).key(&full_key).send().await {
            Ok(_) => Ok(()),
            Err(e) => match classify(&e, key) {
                ErrorKind::NotFound(_) => Ok(()),
                kind => Err(exn::Exn::from(kind)),
            },
        }
    }

    async fn set_public(&self, key: &str, public: bool) -> Result<()> {
        let full_key = self.full_key(key)?;
        let acl = match public {
            true => ObjectCannedAcl::PublicRead,
            false => ObjectCannedAcl::Private,
        };
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(&full_key)
            .acl(acl)
            .send()
            .await
            .map_err(|e| exn::Exn::from(classify(&e, key)))?;
        tracing::debug!(store = %self.name, key, public, "Object visibility set");
        Ok(())
    }

    async fn is_public(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key)?;
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .get_object_acl()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| exn::Exn::from(classify(&e, key)))?;
        Ok(output.grants().iter().any(|grant| {
            let everyone = grant.grantee().and_then(|grantee| grantee.uri()) == Some(ALL_USERS);
            let readable = matches!(grant.permission(), Some(Permission::Read | Permission::FullControl));
            everyone && readable
        }))
    }
}
