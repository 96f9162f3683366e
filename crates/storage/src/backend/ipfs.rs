//! IPFS content network, via a Kubo node's RPC API.
//!
//! Every RPC call is a `POST` to `{api}/api/v0/{command}` with arguments in the
//! query string. Kubo reports failures as HTTP 500 with a JSON body of the
//! shape `{"Message": "...", "Code": 0, "Type": "error"}`, so most of the
//! interesting error handling is string matching on `Message`.
//!
//! Identifiers are CIDs. `put` adds and pins in one call, so the network
//! assigns the key; the key passed in is only used as the filename hint.

use super::{Ack, DirectoryEntry, KeyStream};
use crate::error::{ErrorKind, Result};
use crate::{ContentStore, StoreKind};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use mcarch_model::basename;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// CID of the empty UnixFS directory, the root every synthesized directory
/// starts from.
const EMPTY_DIRECTORY: &str = "QmUNLLsPACCz1vLxQVkXqqLX5R1X345qqfHbsf67hvA3Nn";

/// IPFS content network reached through a Kubo RPC endpoint.
///
/// # Examples
///
/// ```no_run
/// use mcarch_storage::backend::IpfsStore;
/// use mcarch_storage::ContentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = IpfsStore::new("ipfs", "http://127.0.0.1:5001");
/// let pinned = store.list_pinned().await?;
/// println!("{} pins", pinned.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct IpfsStore {
    name: String,
    api: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinListing {
    #[serde(default)]
    keys: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatResponse {
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HashResponse {
    hash: String,
}

impl IpfsStore {
    /// Create a store talking to the Kubo RPC API at `api`
    /// (e.g. `http://127.0.0.1:5001`).
    pub fn new(name: impl Into<String>, api: impl Into<String>) -> Self {
        Self::with_client(name, api, Client::new())
    }

    /// Same as [`new`](Self::new), with a preconfigured HTTP client.
    pub fn with_client(name: impl Into<String>, api: impl Into<String>, client: Client) -> Self {
        let api = api.into().trim_end_matches('/').to_string();
        Self { name: name.into(), api, client }
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{command}", self.api)
    }

    /// Issue one RPC call and return the raw response body.
    async fn rpc(&self, command: &str, query: &[(&str, &str)], form: Option<Form>) -> Result<Vec<u8>> {
        let mut request = self.client.post(self.endpoint(command)).query(query);
        if let Some(form) = form {
            request = request.multipart(form);
        }
        let response = request.send().await.map_err(|e| exn::Exn::from(transport_error(&self.name, command, &e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .or_raise(|| ErrorKind::Unavailable(format!("{}: {command} response interrupted", self.name)))?;
        match status.is_success() {
            true => Ok(body.to_vec()),
            false => Err(exn::Exn::from(rpc_error(command, status, &body))),
        }
    }
}

fn transport_error(store: &str, command: &str, err: &reqwest::Error) -> ErrorKind {
    let message = format!("{store}: {command}: {err}");
    match err.is_timeout() || err.is_connect() || err.is_request() {
        true => ErrorKind::Unavailable(message),
        false => ErrorKind::BackendError(message),
    }
}

/// Classify a non-success RPC response.
fn rpc_error(command: &str, status: StatusCode, body: &[u8]) -> ErrorKind {
    let Ok(KuboError { message }) = serde_json::from_slice::<KuboError>(body) else {
        let message = format!("{command}: HTTP {status}");
        return match status.as_u16() {
            401 | 403 => ErrorKind::PermissionDenied(message),
            404 => ErrorKind::NotFound(message),
            429 | 500..=599 => ErrorKind::Unavailable(message),
            _ => ErrorKind::BackendError(message),
        };
    };
    let lowered = message.to_lowercase();
    if lowered.contains("not pinned") || lowered.contains("not found") || lowered.contains("no link named") {
        ErrorKind::NotFound(format!("{command}: {message}"))
    } else if lowered.contains("invalid path") || lowered.contains("invalid cid") {
        ErrorKind::InvalidKey(format!("{command}: {message}"))
    } else {
        ErrorKind::BackendError(format!("{command}: {message}"))
    }
}

fn is_not_found(err: &crate::error::Error) -> bool {
    matches!(&**err, ErrorKind::NotFound(_))
}

fn decode<'de, T: Deserialize<'de>>(command: &str, body: &'de [u8]) -> Result<T> {
    serde_json::from_slice(body).or_raise(|| ErrorKind::BackendError(format!("{command}: unexpected response")))
}

/// `add` may stream one JSON object per line (progress, then one entry per
/// added node); the last line describes the top-level object.
fn parse_add(body: &[u8]) -> Result<String> {
    let last = body
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .last()
        .unwrap_or_default();
    let response: AddResponse = decode("add", last)?;
    Ok(response.hash)
}

fn parse_pins(body: &[u8]) -> Result<BTreeSet<String>> {
    let listing: PinListing = decode("pin/ls", body)?;
    Ok(listing.keys.into_keys().collect())
}

#[async_trait]
impl ContentStore for IpfsStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Content
    }

    #[tracing::instrument(level = "debug", skip(self, data), fields(store = %self.name, bytes = data.len()))]
    async fn put(&self, key: &str, data: &[u8]) -> Result<Ack> {
        let part = Part::bytes(data.to_vec()).file_name(basename(key).to_string());
        let form = Form::new().part("file", part);
        let body = self.rpc("add", &[("pin", "true"), ("cid-version", "0")], Some(form)).await?;
        let cid = parse_add(&body)?;
        tracing::debug!(store = %self.name, key, %cid, "Added content");
        Ok(Ack { key: cid })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.rpc("cat", &[("arg", key)], None).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.rpc("pin/ls", &[("arg", key), ("type", "recursive")], None).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn list_keys<'a>(&'a self) -> KeyStream<'a> {
        Box::pin(stream! {
            match self.list_pinned().await {
                Ok(pins) => {
                    for pin in pins {
                        yield Ok(pin);
                    }
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.unpin(key).await
    }

    async fn pin(&self, id: &str) -> Result<()> {
        self.rpc("pin/add", &[("arg", id)], None).await?;
        Ok(())
    }

    async fn unpin(&self, id: &str) -> Result<()> {
        match self.rpc("pin/rm", &[("arg", id)], None).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_pinned(&self) -> Result<BTreeSet<String>> {
        let body = self.rpc("pin/ls", &[("type", "recursive")], None).await?;
        parse_pins(&body)
    }

    async fn stat_size(&self, id: &str) -> Result<u64> {
        let path = format!("/ipfs/{id}");
        let body = self.rpc("files/stat", &[("arg", path.as_str())], None).await?;
        let stat: StatResponse = decode("files/stat", &body)?;
        Ok(stat.size)
    }

    async fn make_directory(&self, entries: &[DirectoryEntry]) -> Result<String> {
        let mut root = EMPTY_DIRECTORY.to_string();
        for entry in entries {
            let body = self
                .rpc(
                    "object/patch/add-link",
                    &[("arg", root.as_str()), ("arg", entry.name.as_str()), ("arg", entry.id.as_str())],
                    None,
                )
                .await?;
            let patched: HashResponse = decode("object/patch/add-link", &body)?;
            root = patched.hash;
        }
        tracing::debug!(store = %self.name, links = entries.len(), %root, "Directory synthesized");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::ops::Deref;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn kubo_error(message: &str) -> ResponseTemplate {
        ResponseTemplate::new(500).set_body_json(serde_json::json!({"Message": message, "Code": 0, "Type": "error"}))
    }

    async fn node() -> (MockServer, IpfsStore) {
        let server = MockServer::start().await;
        let store = IpfsStore::new("ipfs", server.uri());
        (server, store)
    }

    #[test]
    fn test_parse_add_takes_last_line() {
        let body = br#"{"Name":"examplemod-1.0.jar","Hash":"QmChild","Size":"1024"}
{"Name":"","Hash":"QmTop","Size":"1100"}
"#;
        assert_eq!(parse_add(body).unwrap(), "QmTop");
    }

    #[test]
    fn test_parse_add_rejects_garbage() {
        assert!(parse_add(b"<html>bad gateway</html>").is_err());
        assert!(parse_add(b"").is_err());
    }

    #[test]
    fn test_parse_pins() {
        let body = br#"{"Keys":{"QmA":{"Type":"recursive"},"QmB":{"Type":"recursive","Name":""}}}"#;
        let pins = parse_pins(body).unwrap();
        assert_eq!(pins.into_iter().collect::<Vec<_>>(), vec!["QmA", "QmB"]);
        assert!(parse_pins(br#"{"Keys":{}}"#).unwrap().is_empty());
    }

    #[rstest]
    #[case(r#"{"Message":"path 'QmX' is not pinned","Code":0,"Type":"error"}"#, "not found")]
    #[case(r#"{"Message":"block was not found locally (offline)","Code":0,"Type":"error"}"#, "not found")]
    #[case(r#"{"Message":"invalid path \"nope\": invalid cid","Code":0,"Type":"error"}"#, "invalid key")]
    #[case(r#"{"Message":"merkledag: something odd","Code":0,"Type":"error"}"#, "backend error")]
    fn test_rpc_error_from_kubo_message(#[case] body: &str, #[case] prefix: &str) {
        let kind = rpc_error("pin/ls", StatusCode::INTERNAL_SERVER_ERROR, body.as_bytes());
        assert!(kind.to_string().starts_with(prefix), "{kind}");
    }

    #[rstest]
    #[case(StatusCode::BAD_GATEWAY, true)]
    #[case(StatusCode::TOO_MANY_REQUESTS, true)]
    #[case(StatusCode::FORBIDDEN, false)]
    fn test_rpc_error_without_body(#[case] status: StatusCode, #[case] retryable: bool) {
        assert_eq!(rpc_error("add", status, b"").is_retryable(), retryable);
    }

    #[test]
    fn test_not_found_helper() {
        let err = exn::Exn::from(ErrorKind::NotFound("QmX".into()));
        assert!(is_not_found(&err));
        assert!(matches!(err.deref(), ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_api_trailing_slash_trimmed() {
        let store = IpfsStore::new("ipfs", "http://127.0.0.1:5001/");
        assert_eq!(store.endpoint("pin/ls"), "http://127.0.0.1:5001/api/v0/pin/ls");
    }

    #[tokio::test]
    async fn test_put_adds_pins_and_names_the_file() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .and(query_param("pin", "true"))
            .and(body_string_contains("filename=\"examplemod-1.0.jar\""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"Name\":\"examplemod-1.0.jar\",\"Hash\":\"QmChild\",\"Size\":\"30\"}\n{\"Name\":\"\",\"Hash\":\"QmTop\",\"Size\":\"80\"}\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let ack = store.put("abcd/examplemod-1.0.jar", b"examplemod 1.0 jar bytes").await.unwrap();
        assert_eq!(ack.key, "QmTop");
    }

    #[tokio::test]
    async fn test_pin_asks_for_the_identifier() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/add"))
            .and(query_param("arg", "QmA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Pins": ["QmA"]})))
            .expect(1)
            .mount(&server)
            .await;

        store.pin("QmA").await.unwrap();
    }

    #[tokio::test]
    async fn test_unpin_of_unpinned_content_succeeds() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/rm"))
            .respond_with(kubo_error("not pinned or pinned indirectly"))
            .expect(2)
            .mount(&server)
            .await;

        store.unpin("QmGone").await.unwrap();
        store.delete("QmGone").await.unwrap();
    }

    #[tokio::test]
    async fn test_unpin_reports_other_failures() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/rm"))
            .respond_with(kubo_error("merkledag: something odd"))
            .mount(&server)
            .await;

        let err = store.unpin("QmA").await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::BackendError(_)));
    }

    #[tokio::test]
    async fn test_list_pinned_and_exists() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .and(query_param("arg", "QmMissing"))
            .respond_with(kubo_error("path 'QmMissing' is not pinned"))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .and(query_param("type", "recursive"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Keys": {"QmA": {"Type": "recursive"}, "QmB": {"Type": "recursive"}}
            })))
            .mount(&server)
            .await;

        let pins = store.list_pinned().await.unwrap();
        assert_eq!(pins.into_iter().collect::<Vec<_>>(), vec!["QmA", "QmB"]);
        assert_eq!(store.list_all_keys().await.unwrap().len(), 2);
        assert!(!store.exists("QmMissing").await.unwrap());
    }

    #[tokio::test]
    async fn test_stat_size_reads_files_stat() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/files/stat"))
            .and(query_param("arg", "/ipfs/QmA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Hash": "QmA", "Size": 1024, "CumulativeSize": 1035, "Blocks": 1, "Type": "file"
            })))
            .mount(&server)
            .await;

        assert_eq!(store.stat_size("QmA").await.unwrap(), 1024);
    }

    #[tokio::test]
    async fn test_make_directory_chains_links_from_the_empty_directory() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/object/patch/add-link"))
            .and(query_param("arg", EMPTY_DIRECTORY))
            .and(query_param("arg", "a.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Hash": "QmDirA"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/object/patch/add-link"))
            .and(query_param("arg", "QmDirA"))
            .and(query_param("arg", "b.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Hash": "QmDirAB"})))
            .expect(1)
            .mount(&server)
            .await;

        let entries = [DirectoryEntry::new("a.jar", "QmShared"), DirectoryEntry::new("b.jar", "QmShared")];
        assert_eq!(store.make_directory(&entries).await.unwrap(), "QmDirAB");
    }

    #[tokio::test]
    async fn test_gateway_errors_are_retryable() {
        let (server, store) = node().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = store.list_pinned().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
