//! Ordered fallback across the local mirror and remote origins.
//!
//! # State Machine
//! ```text
//! LocalStore.lookup ── hit ──────────────────────────────▶ Served-Local
//!        │ miss
//!        ├─ fidelity: fetch original URL ── ok ─────────▶ Served-Remote-Live
//!        │                                └─ fail ─────▶ NotFound
//!        └─ mirrors: for mirror in list
//!               raw path ── ok ─────────────────────────▶ Served-Remote-Mirror
//!               (no extension) for name in index names
//!                   path/name ── ok ────────────────────▶ Served-Remote-Mirror
//!           exhausted ──────────────────────────────────▶ NotFound
//! ```
//!
//! Local beats remote, earlier mirrors beat later ones, the raw path beats
//! index variants at the same mirror. Each (mirror, path) pair is tried once.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::{FallbackMode, LegacyConfig};
use crate::http::request::RequestTarget;
use crate::observability::metrics;
use crate::resolve::local::LocalStore;
use crate::resolve::origin::{OriginClient, OriginFetcher};
use crate::resolve::path::ResolvedPath;
use crate::resolve::types::{ContentCandidate, FetchError, RemoteHit, ResolveError, Served};

/// Result of walking the chain for one request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub served: Served,
    pub candidate: ContentCandidate,
}

impl Resolution {
    fn not_found() -> Self {
        Self {
            served: Served::NotFound,
            candidate: ContentCandidate::Miss,
        }
    }

    fn remote(served: Served, hit: RemoteHit) -> Self {
        Self {
            served,
            candidate: ContentCandidate::Remote(hit),
        }
    }
}

type InflightMap = DashMap<ResolvedPath, Arc<Mutex<()>>>;

/// The content resolution engine.
pub struct FallbackChain {
    store: LocalStore,
    fetcher: OriginFetcher,
    mode: FallbackMode,
    mirrors: Vec<String>,
    inflight: Option<InflightMap>,
}

impl FallbackChain {
    pub fn new(
        store: LocalStore,
        fetcher: OriginFetcher,
        mode: FallbackMode,
        mirrors: Vec<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            mode,
            mirrors,
            inflight: None,
        }
    }

    /// Build from the legacy section; `root` must already be normalized.
    pub fn from_config(config: &LegacyConfig, root: PathBuf, client: Arc<dyn OriginClient>) -> Self {
        let store = LocalStore::new(root, config.index_files.clone());
        let fetcher = OriginFetcher::new(client, store.clone());
        Self::new(store, fetcher, config.mode, config.mirrors.clone())
            .with_dedupe(config.dedupe_fetches)
    }

    /// Collapse concurrent remote fetches for the same local path.
    pub fn with_dedupe(mut self, enabled: bool) -> Self {
        self.inflight = enabled.then(DashMap::new);
        self
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn mode(&self) -> FallbackMode {
        self.mode
    }

    /// Resolve a request against the local mirror, then remote origins.
    pub async fn resolve(&self, request: &RequestTarget) -> Result<Resolution, ResolveError> {
        let key = request.local_key();

        let resolution = match self.lookup_local(&key).await? {
            Some(local) => local,
            None => match &self.inflight {
                Some(map) => self.resolve_deduped(map, request, &key).await?,
                None => self.resolve_remote(request).await,
            },
        };

        tracing::debug!(
            method = %request.method,
            key = %key,
            served = resolution.served.as_str(),
            "Fallback chain resolved"
        );
        metrics::record_resolution(resolution.served);
        Ok(resolution)
    }

    async fn lookup_local(&self, key: &str) -> Result<Option<Resolution>, ResolveError> {
        match self.store.lookup(key).await? {
            hit @ ContentCandidate::Local(_) => Ok(Some(Resolution {
                served: Served::Local,
                candidate: hit,
            })),
            _ => Ok(None),
        }
    }

    async fn resolve_deduped(
        &self,
        map: &InflightMap,
        request: &RequestTarget,
        key: &str,
    ) -> Result<Resolution, ResolveError> {
        let resolved = self.store.resolve(key)?;
        let slot = map.entry(resolved.clone()).or_default().clone();

        let result = {
            let _guard = slot.lock().await;
            match self.lookup_local(key).await {
                Ok(Some(local)) => Ok(local),
                Ok(None) => Ok(self.resolve_remote(request).await),
                Err(e) => Err(e),
            }
        };

        map.remove_if(&resolved, |_, v| Arc::strong_count(v) == 2);
        result
    }

    async fn resolve_remote(&self, request: &RequestTarget) -> Resolution {
        match self.mode {
            FallbackMode::Fidelity => match self.attempt("", request).await {
                Some(hit) => Resolution::remote(Served::RemoteLive, hit),
                None => Resolution::not_found(),
            },
            FallbackMode::Mirrors => {
                let try_indexes = request.extension().is_none();
                for mirror in &self.mirrors {
                    if let Some(hit) = self.attempt(mirror, request).await {
                        return Resolution::remote(Served::RemoteMirror, hit);
                    }
                    if !try_indexes {
                        continue;
                    }
                    for name in self.store.index_names() {
                        let variant = request.with_index(name);
                        if let Some(hit) = self.attempt(mirror, &variant).await {
                            return Resolution::remote(Served::RemoteMirror, hit);
                        }
                    }
                }
                Resolution::not_found()
            }
        }
    }

    async fn attempt(&self, mirror: &str, target: &RequestTarget) -> Option<RemoteHit> {
        match self.fetcher.fetch_and_store(mirror, target).await {
            Ok(hit) => Some(hit),
            Err(e) => {
                match &e {
                    FetchError::Status(status) => {
                        tracing::trace!(mirror, key = %target.local_key(), %status, "Origin miss");
                    }
                    FetchError::Transport(_) | FetchError::InvalidUrl(_) => {
                        tracing::warn!(mirror, key = %target.local_key(), error = %e, "Origin fetch failed");
                    }
                }
                metrics::record_fetch_failure(e.kind());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::header::HeaderMap;
    use reqwest::{Method, StatusCode};
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use url::Url;

    use crate::resolve::origin::OriginResponse;

    /// Records every URL asked for; answers 200 for URLs in `ok`, a transport
    /// error for URLs in `broken`, 404 otherwise.
    #[derive(Default)]
    struct CountingClient {
        ok: Vec<(String, &'static str)>,
        broken: Vec<String>,
        delay: Option<Duration>,
        calls: StdMutex<Vec<String>>,
    }

    impl CountingClient {
        fn ok(mut self, url: &str, body: &'static str) -> Self {
            self.ok.push((url.to_string(), body));
            self
        }

        fn broken(mut self, url: &str) -> Self {
            self.broken.push(url.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OriginClient for CountingClient {
        async fn fetch(&self, _method: Method, url: Url, _body: Bytes) -> Result<OriginResponse, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.broken.iter().any(|u| u == url.as_str()) {
                return Err(FetchError::Transport("connection refused".into()));
            }
            let (status, body) = match self.ok.iter().find(|(u, _)| u == url.as_str()) {
                Some((_, body)) => (StatusCode::OK, *body),
                None => (StatusCode::NOT_FOUND, "404 Not Found"),
            };
            Ok(OriginResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::from_static(body.as_bytes()),
            })
        }
    }

    const A: &str = "http://a.example/htdocs";
    const B: &str = "http://b.example";

    fn chain(root: &Path, client: Arc<CountingClient>, mode: FallbackMode) -> FallbackChain {
        let config = LegacyConfig {
            mode,
            mirrors: vec![A.to_string(), B.to_string()],
            ..LegacyConfig::default()
        };
        FallbackChain::from_config(&config, root.to_path_buf(), client)
    }

    fn get(url: &str) -> RequestTarget {
        RequestTarget::from_url(Method::GET, &Url::parse(url).unwrap())
    }

    fn body(resolution: &Resolution) -> &[u8] {
        resolution.candidate.body().map(|b| &b[..]).unwrap_or_default()
    }

    #[tokio::test]
    async fn local_hit_makes_no_network_call() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("example.com")).unwrap();
        std::fs::write(tmp.path().join("example.com/x.swf"), "local").unwrap();
        let client = Arc::new(CountingClient::default().ok(&format!("{A}/example.com/x.swf"), "remote"));

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Mirrors)
            .resolve(&get("http://example.com/x.swf"))
            .await
            .unwrap();

        assert_eq!(resolution.served, Served::Local);
        assert_eq!(body(&resolution), b"local");
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn later_mirror_serves_when_earlier_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::default().ok(&format!("{B}/example.com/x.dat"), "from b"));

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Mirrors)
            .resolve(&get("http://example.com/x.dat"))
            .await
            .unwrap();

        assert_eq!(resolution.served, Served::RemoteMirror);
        assert_eq!(body(&resolution), b"from b");
        assert_eq!(
            client.calls(),
            vec![format!("{A}/example.com/x.dat"), format!("{B}/example.com/x.dat")]
        );
    }

    #[tokio::test]
    async fn raw_path_beats_index_variants_at_same_mirror() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(
            CountingClient::default()
                .ok(&format!("{A}/example.com/sub"), "raw")
                .ok(&format!("{A}/example.com/sub/index.html"), "index"),
        );

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Mirrors)
            .resolve(&get("http://example.com/sub"))
            .await
            .unwrap();

        assert_eq!(body(&resolution), b"raw");
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn index_variants_tried_in_order_before_next_mirror() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(
            CountingClient::default()
                .ok(&format!("{A}/example.com/sub/index.htm"), "a htm")
                .ok(&format!("{B}/example.com/sub"), "b raw"),
        );

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Mirrors)
            .resolve(&get("http://example.com/sub/"))
            .await
            .unwrap();

        assert_eq!(body(&resolution), b"a htm");
        assert_eq!(
            client.calls(),
            vec![
                format!("{A}/example.com/sub/"),
                format!("{A}/example.com/sub/index.html"),
                format!("{A}/example.com/sub/index.htm"),
            ]
        );
        let persisted = tmp.path().join("example.com/sub/index.htm");
        assert_eq!(std::fs::read(persisted).unwrap(), b"a htm");
    }

    #[tokio::test]
    async fn transport_error_does_not_abort_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(
            CountingClient::default()
                .broken(&format!("{A}/example.com/a.png"))
                .ok(&format!("{B}/example.com/a.png"), "png"),
        );

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Mirrors)
            .resolve(&get("http://example.com/a.png"))
            .await
            .unwrap();

        assert_eq!(resolution.served, Served::RemoteMirror);
        assert_eq!(body(&resolution), b"png");
    }

    #[tokio::test]
    async fn everything_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::default());

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Mirrors)
            .resolve(&get("http://example.com/gone"))
            .await
            .unwrap();

        assert_eq!(resolution.served, Served::NotFound);
        assert!(resolution.candidate.is_miss());
        // raw + two index variants at each of two mirrors
        assert_eq!(client.calls().len(), 6);
    }

    #[tokio::test]
    async fn cache_fill_turns_next_request_local() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::default().ok(&format!("{A}/example.com/assets/a.png"), "png"));
        let chain = chain(tmp.path(), client.clone(), FallbackMode::Mirrors);
        let request = get("http://example.com/assets/a.png");

        let first = chain.resolve(&request).await.unwrap();
        let second = chain.resolve(&request).await.unwrap();

        assert_eq!(first.served, Served::RemoteMirror);
        assert_eq!(second.served, Served::Local);
        assert_eq!(body(&second), b"png");
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn fidelity_mode_makes_exactly_one_live_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient::default().ok("http://example.com/live.php?a=1", "live"));

        let hit = chain(tmp.path(), client.clone(), FallbackMode::Fidelity)
            .resolve(&get("http://example.com/live.php?a=1"))
            .await
            .unwrap();
        assert_eq!(hit.served, Served::RemoteLive);
        assert_eq!(body(&hit), b"live");

        let miss = chain(tmp.path(), client.clone(), FallbackMode::Fidelity)
            .resolve(&get("http://example.com/dir"))
            .await
            .unwrap();
        assert_eq!(miss.served, Served::NotFound);
        assert_eq!(
            client.calls(),
            vec!["http://example.com/live.php?a=1".to_string(), "http://example.com/dir".to_string()]
        );
    }

    fn raw(uri: &str) -> RequestTarget {
        let parts = axum::http::Request::builder().uri(uri).body(()).unwrap().into_parts().0;
        RequestTarget::from_parts(&parts, Bytes::new())
    }

    #[tokio::test]
    async fn encoded_traversal_stays_under_requesting_host() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("victim.com")).unwrap();
        std::fs::write(tmp.path().join("victim.com/game.swf"), "genuine").unwrap();
        let request = raw("http://evil.com/..%2Fvictim.com%2Fgame.swf");
        let client = Arc::new(CountingClient::default().ok(request.url().unwrap().as_str(), "evil"));

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Fidelity)
            .resolve(&request)
            .await
            .unwrap();

        assert_eq!(resolution.served, Served::RemoteLive);
        assert_eq!(body(&resolution), b"evil");
        assert_eq!(std::fs::read(tmp.path().join("victim.com/game.swf")).unwrap(), b"genuine");
        assert_eq!(std::fs::read(tmp.path().join("evil.com/victim.com/game.swf")).unwrap(), b"evil");
    }

    #[tokio::test]
    async fn encoded_traversal_asks_mirrors_under_requesting_host() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("victim.com")).unwrap();
        std::fs::write(tmp.path().join("victim.com/game.swf"), "genuine").unwrap();
        let client = Arc::new(CountingClient::default().ok(&format!("{A}/evil.com/victim.com/game.swf"), "evil"));

        let resolution = chain(tmp.path(), client.clone(), FallbackMode::Mirrors)
            .resolve(&raw("http://evil.com/..%5Cvictim.com%5Cgame.swf"))
            .await
            .unwrap();

        assert_eq!(resolution.served, Served::RemoteMirror);
        assert_eq!(client.calls(), vec![format!("{A}/evil.com/victim.com/game.swf")]);
        assert_eq!(std::fs::read(tmp.path().join("victim.com/game.swf")).unwrap(), b"genuine");
    }

    #[tokio::test]
    async fn directory_request_serves_first_existing_index() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/index.htm"), "<html>htm</html>").unwrap();
        let client = Arc::new(CountingClient::default());
        let chain = chain(tmp.path(), client.clone(), FallbackMode::Mirrors);

        let mut request = get("http://example.com/sub/");
        request.host = String::new();
        let resolution = chain.resolve(&request).await.unwrap();

        assert_eq!(resolution.served, Served::Local);
        assert_eq!(body(&resolution), b"<html>htm</html>");
        match resolution.candidate {
            ContentCandidate::Local(hit) => assert_eq!(hit.path.as_path(), tmp.path().join("sub/index.htm")),
            other => panic!("expected local hit, got {other:?}"),
        }
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn dedupe_collapses_concurrent_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(CountingClient {
            delay: Some(Duration::from_millis(50)),
            ..CountingClient::default().ok(&format!("{A}/example.com/big.swf"), "swf")
        });
        let chain = chain(tmp.path(), client.clone(), FallbackMode::Mirrors).with_dedupe(true);
        let request = get("http://example.com/big.swf");

        let (first, second) = tokio::join!(chain.resolve(&request), chain.resolve(&request));
        let mut served = vec![first.unwrap().served, second.unwrap().served];
        served.sort_by_key(|s| s.as_str());

        assert_eq!(served, vec![Served::Local, Served::RemoteMirror]);
        assert_eq!(client.calls().len(), 1);
        assert!(chain.inflight.as_ref().unwrap().is_empty());
    }
}
