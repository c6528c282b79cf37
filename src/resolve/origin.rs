//! Remote fetch with local persist ("cache fill").
//!
//! # Responsibilities
//! - Build the outbound URL for a mirror (or the live URL)
//! - Issue one request reusing the original method and body
//! - On `200 OK`, write the body under the mirror root before returning it
//!
//! # Design Decisions
//! - The body is buffered, so the returned response and the persisted copy
//!   never compete for the same stream
//! - Writes overwrite unconditionally; concurrent fills of one path race
//!   and the last writer wins
//! - A failed cache fill still returns the content; it is logged, not retried

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::http::request::{RequestTarget, LOCAL_FILENAME_HEADER};
use crate::observability::metrics;
use crate::resolve::local::LocalStore;
use crate::resolve::path::ResolvedPath;
use crate::resolve::types::{FetchError, RemoteHit};

/// A fully buffered origin response.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport used to reach remote origins.
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(&self, method: Method, url: Url, body: Bytes) -> Result<OriginResponse, FetchError>;
}

/// `reqwest`-backed origin client with a fixed deadline per request.
#[derive(Debug, Clone)]
pub struct HttpOriginClient {
    client: reqwest::Client,
}

impl HttpOriginClient {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    async fn fetch(&self, method: Method, url: Url, body: Bytes) -> Result<OriginResponse, FetchError> {
        let response = self
            .client
            .request(method, url)
            .body(body)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}

/// Build `prefix/host/path` for a mirror; the query is not forwarded.
///
/// The host and every segment of the cleaned request path are appended as
/// escaped segments, so `?`, `#`, `%` and encoded separators in the request
/// stay inside the path and `..` never climbs above the prefix.
pub fn mirror_url(prefix: &str, target: &RequestTarget) -> Result<Url, FetchError> {
    let invalid = || FetchError::InvalidUrl(prefix.to_string());
    let mut url = Url::parse(prefix).map_err(|_| invalid())?;
    let cleaned = target.clean_path();
    {
        let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
        segments.pop_if_empty();
        if !target.host.is_empty() {
            segments.push(&target.host);
        }
        segments.extend(cleaned.split('/').filter(|s| !s.is_empty()));
        if target.path.ends_with('/') && cleaned != "/" {
            segments.push("");
        }
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Fetches from remote origins and fills the local mirror.
#[derive(Clone)]
pub struct OriginFetcher {
    client: Arc<dyn OriginClient>,
    store: LocalStore,
}

impl OriginFetcher {
    pub fn new(client: Arc<dyn OriginClient>, store: LocalStore) -> Self {
        Self { client, store }
    }

    /// Fetch `target` through `mirror_prefix` (or live when empty) and persist
    /// a `200 OK` body at the target's own local path.
    pub async fn fetch_and_store(
        &self,
        mirror_prefix: &str,
        target: &RequestTarget,
    ) -> Result<RemoteHit, FetchError> {
        let url = if mirror_prefix.is_empty() {
            target
                .url()
                .map_err(|_| FetchError::InvalidUrl(target.local_key()))?
        } else {
            mirror_url(mirror_prefix, target)?
        };

        let response = self
            .client
            .fetch(target.method.clone(), url.clone(), target.body.clone())
            .await?;

        if response.status != StatusCode::OK {
            return Err(FetchError::Status(response.status));
        }

        let mut headers = response.headers;
        headers.remove(LOCAL_FILENAME_HEADER);
        let persisted = match self.store.resolve(&target.local_key()) {
            Ok(local) => match persist(&local, &response.body).await {
                Ok(()) => {
                    if let Ok(value) = HeaderValue::from_str(&local.to_string()) {
                        headers.insert(LOCAL_FILENAME_HEADER, value);
                    }
                    tracing::debug!(url = %url, path = %local, bytes = response.body.len(), "Cache filled");
                    Some(local)
                }
                Err(e) => {
                    tracing::error!(url = %url, path = %local, error = %e, "Cache fill failed");
                    metrics::record_cache_fill_failure();
                    None
                }
            },
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Cache fill skipped");
                metrics::record_cache_fill_failure();
                None
            }
        };

        Ok(RemoteHit {
            url: url.to_string(),
            status: response.status,
            headers,
            body: response.body,
            persisted,
        })
    }
}

async fn persist(path: &ResolvedPath, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.as_path().parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(path.as_path()).await?;
    file.write_all(body).await?;
    file.flush().await
}
