//! Tunnel rejection middleware.
//! Plain-HTTP proxying only; `CONNECT` tunnels are refused up front.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn reject_connect(req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::CONNECT {
        tracing::debug!(authority = %req.uri(), "Refusing CONNECT tunnel");
        return (StatusCode::NOT_IMPLEMENTED, "CONNECT is not supported").into_response();
    }
    next.run(req).await
}
