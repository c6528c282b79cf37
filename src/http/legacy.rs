//! Built-in legacy server.
//!
//! Serves the local mirror on the legacy port and fills it from remote
//! origins on a miss. The gateway dials this listener as an HTTP proxy, so
//! requests arrive in absolute form.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{GatewayConfig, MimeTable};
use crate::http::request::RequestTarget;
use crate::http::response;
use crate::lifecycle::shutdown;
use crate::resolve::FallbackChain;

#[derive(Clone)]
struct LegacyState {
    chain: Arc<FallbackChain>,
    mime: Arc<MimeTable>,
    max_body_size: usize,
}

/// HTTP exposure of the fallback chain.
pub struct LegacyServer {
    router: Router,
}

impl LegacyServer {
    pub fn new(chain: Arc<FallbackChain>, config: &GatewayConfig) -> Self {
        let state = LegacyState {
            chain,
            mime: Arc::new(config.mime.archive.clone()),
            max_body_size: config.proxy.max_body_size,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: LegacyState) -> Router {
        Router::new()
            .fallback(legacy_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The service, for callers that drive it without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Legacy server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("Legacy server stopped");
        Ok(())
    }
}

async fn legacy_handler(State(state): State<LegacyState>, request: Request<Body>) -> Response {
    let target = match RequestTarget::from_request(request, state.max_body_size).await {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected legacy request");
            return response::request_error(&e);
        }
    };

    match state.chain.resolve(&target).await {
        Ok(resolution) => {
            tracing::debug!(
                key = %target.local_key(),
                served = resolution.served.as_str(),
                "Legacy request resolved"
            );
            response::from_resolution(resolution, &target.path, &state.mime)
        }
        Err(e) => {
            tracing::error!(key = %target.local_key(), error = %e, "Legacy lookup failed");
            response::resolve_error(&e)
        }
    }
}
