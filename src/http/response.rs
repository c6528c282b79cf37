//! Response construction.
//!
//! # Responsibilities
//! - Turn a fallback resolution into a client response
//! - Relay upstream responses without buffering their bodies
//! - Map local failures to status codes
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped from every relayed response
//! - Responses served from disk carry the local filename header

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::config::MimeTable;
use crate::http::mime;
use crate::http::request::{strip_hop_by_hop, RequestError, LOCAL_FILENAME_HEADER};
use crate::resolve::{ContentCandidate, Resolution, ResolveError};

/// Build the response for a resolved request.
///
/// `table` supplies the initial Content-Type, chosen from the request path
/// and the file that was actually served.
pub fn from_resolution(resolution: Resolution, request_path: &str, table: &MimeTable) -> Response {
    let (mut headers, body) = match resolution.candidate {
        ContentCandidate::Local(hit) => {
            let mut headers = HeaderMap::new();
            set_local_filename(&mut headers, &hit.path.to_string());
            (headers, hit.body)
        }
        ContentCandidate::Remote(hit) => {
            let mut headers = hit.headers;
            strip_hop_by_hop(&mut headers);
            headers.remove(header::CONTENT_LENGTH);
            (headers, hit.body)
        }
        ContentCandidate::Miss => return not_found(),
    };

    let filename = headers
        .get(LOCAL_FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mime::negotiate(&mut headers, request_path, filename.as_deref(), table);

    with_body(StatusCode::OK, headers, body)
}

/// Relay an upstream response, streaming its body.
pub fn from_upstream(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 Not Found").into_response()
}

pub fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, "502 Bad Gateway").into_response()
}

pub fn request_error(err: &RequestError) -> Response {
    let status = match err {
        RequestError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        RequestError::Body(_) => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string()).into_response()
}

pub fn resolve_error(err: &ResolveError) -> Response {
    match err {
        ResolveError::PathEscape(_) => (StatusCode::BAD_REQUEST, "400 Bad Request").into_response(),
        ResolveError::Io { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error").into_response()
        }
    }
}

fn set_local_filename(headers: &mut HeaderMap, filename: &str) {
    match HeaderValue::from_str(filename) {
        Ok(value) => {
            headers.insert(LOCAL_FILENAME_HEADER, value);
        }
        Err(_) => tracing::debug!(filename, "Local filename is not a valid header value"),
    }
}

fn with_body(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
