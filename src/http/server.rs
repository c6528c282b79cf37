//! Gateway HTTP server.
//!
//! # Responsibilities
//! - Accept plain-HTTP proxy requests (absolute-form) and origin-form requests
//! - Forward every request to the archive backend first
//! - Fall back to the legacy backend when the archive answers >= 400 or fails
//! - Negotiate the Content-Type of whatever comes back
//! - Wire up middleware (request ID, tracing, timeout, tunnel rejection)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::{GatewayConfig, MimeTable};
use crate::http::middleware::reject_connect;
use crate::http::request::{RequestTarget, LOCAL_FILENAME_HEADER};
use crate::http::{mime, response};
use crate::lifecycle::shutdown;
use crate::observability::metrics;

const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct GatewayState {
    archive: reqwest::Client,
    legacy: reqwest::Client,
    archive_port: u16,
    api_prefix: String,
    overrides: Arc<MimeTable>,
    max_body_size: usize,
    verbose: bool,
}

impl GatewayState {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let connect = Duration::from_secs(config.timeouts.connect_secs);
        let deadline = Duration::from_secs(config.timeouts.upstream_secs);

        let archive = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(deadline)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        // The legacy backend is dialled as a proxy: the target host name is
        // carried in the request line and never resolved.
        let legacy_proxy = reqwest::Proxy::all(format!("http://127.0.0.1:{}", config.legacy.port))?;
        let legacy = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(deadline)
            .redirect(reqwest::redirect::Policy::none())
            .proxy(legacy_proxy)
            .build()?;

        Ok(Self {
            archive,
            legacy,
            archive_port: config.archive.port,
            api_prefix: config.archive.api_prefix.clone(),
            overrides: Arc::new(config.mime.overrides.clone()),
            max_body_size: config.proxy.max_body_size,
            verbose: config.observability.verbose,
        })
    }

    /// `http://127.0.0.1:{port}/{prefix}{host}{path}?{query}`
    pub fn archive_url(&self, target: &RequestTarget) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("http://127.0.0.1:{}/", self.archive_port))?;
        url.set_path(&format!(
            "{}{}{}",
            self.api_prefix.trim_start_matches('/'),
            target.host,
            target.raw_path
        ));
        url.set_query(target.query.as_deref());
        Ok(url)
    }
}

/// The proxy-facing server.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let state = GatewayState::new(config)?;
        Ok(Self {
            router: Self::build_router(config, state),
        })
    }

    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: GatewayState) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .fallback(gateway_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(middleware::from_fn(reject_connect)),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run until `shutdown_rx` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

/// Archive first, legacy second, 502 when both fail.
async fn gateway_handler(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let target = match RequestTarget::from_request(request, state.max_body_size).await {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected proxy request");
            return response::request_error(&e);
        }
    };

    if state.verbose {
        tracing::debug!(method = %target.method, key = %target.local_key(), "Proxy request");
    }

    let (source, upstream) = match forward_to_archive(&state, &target).await {
        Some(upstream) => ("archive", upstream),
        None => match forward_to_legacy(&state, &target).await {
            Some(upstream) => ("legacy", upstream),
            None => {
                metrics::record_request("none", 502, start);
                return response::bad_gateway();
            }
        },
    };

    let filename = upstream
        .headers()
        .get(LOCAL_FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let status = upstream.status();

    let mut response = response::from_upstream(upstream);
    mime::negotiate(
        response.headers_mut(),
        &target.path,
        filename.as_deref(),
        &state.overrides,
    );

    tracing::debug!(
        key = %target.local_key(),
        source,
        status = status.as_u16(),
        "Proxy response"
    );
    metrics::record_request(source, status.as_u16(), start);
    response
}

/// `Some` only when the archive answered below 400.
async fn forward_to_archive(state: &GatewayState, target: &RequestTarget) -> Option<reqwest::Response> {
    let url = match state.archive_url(target) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(key = %target.local_key(), error = %e, "Cannot build archive URL");
            return None;
        }
    };

    let result = state
        .archive
        .request(target.method.clone(), url)
        .headers(target.forward_headers())
        .body(target.body.clone())
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().as_u16() < 400 => Some(resp),
        Ok(resp) => {
            tracing::debug!(key = %target.local_key(), status = %resp.status(), "Archive miss");
            None
        }
        Err(e) => {
            tracing::warn!(key = %target.local_key(), error = %e, "Archive backend unreachable");
            None
        }
    }
}

async fn forward_to_legacy(state: &GatewayState, target: &RequestTarget) -> Option<reqwest::Response> {
    let url = match target.url() {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(key = %target.local_key(), error = %e, "Cannot build legacy URL");
            return None;
        }
    };

    let result = state
        .legacy
        .request(target.method.clone(), url)
        .headers(target.forward_headers())
        .body(target.body.clone())
        .send()
        .await;

    match result {
        Ok(resp) => Some(resp),
        Err(e) => {
            tracing::warn!(key = %target.local_key(), error = %e, "Legacy backend unreachable");
            None
        }
    }
}
