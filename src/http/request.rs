//! Inbound request view.
//!
//! # Responsibilities
//! - Capture method, host, path, query, headers and body of an inbound
//!   request as one immutable value
//! - Accept both proxy (absolute-form) and origin-form request targets
//! - Strip hop-by-hop headers before anything is forwarded
//!
//! # Design Decisions
//! - The body is buffered once (bounded) so every fallback attempt can
//!   replay the same method and body
//! - Rewrites produce a new value; the original is never mutated

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, Method, Request};
use bytes::Bytes;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;
use url::Url;

use crate::resolve::path;

/// Header carrying the local file a response was served from.
pub const LOCAL_FILENAME_HEADER: &str = "zipsvr_filename";

/// Characters escaped when a decoded name becomes a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Errors while capturing an inbound request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("failed to read request body: {0}")]
    Body(String),
}

/// Immutable view of an inbound HTTP request.
#[derive(Debug, Clone)]
pub struct RequestTarget {
    pub method: Method,
    pub scheme: String,
    /// `host[:port]`, empty when neither the URI nor a usable Host header
    /// names one.
    pub host: String,
    /// Percent-decoded path, always starting with `/`. Local keys and
    /// extensions only.
    pub path: String,
    /// The path exactly as received, still percent-encoded. Outbound URLs only.
    pub raw_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestTarget {
    /// Capture a request, buffering at most `limit` body bytes.
    pub async fn from_request(request: Request<Body>, limit: usize) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(RequestError::BodyTooLarge(limit));
        }

        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| RequestError::Body(e.to_string()))?;
        Ok(Self::from_parts(&parts, body))
    }

    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let uri = &parts.uri;
        let host = match uri.authority() {
            Some(authority) => authority.as_str(),
            None => parts
                .headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default(),
        };
        let raw_path = if uri.path().starts_with('/') {
            uri.path().to_string()
        } else {
            format!("/{}", uri.path())
        };

        Self {
            method: parts.method.clone(),
            scheme: uri.scheme_str().unwrap_or("http").to_string(),
            host: sanitize_host(host),
            path: percent_decode_str(&raw_path).decode_utf8_lossy().into_owned(),
            raw_path,
            query: uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            body,
        }
    }

    /// A bodiless request for `url`.
    pub fn from_url(method: Method, url: &Url) -> Self {
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        Self {
            method,
            scheme: url.scheme().to_string(),
            host: sanitize_host(&host),
            path: percent_decode_str(url.path()).decode_utf8_lossy().into_owned(),
            raw_path: url.path().to_string(),
            query: url.query().map(str::to_string),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The full original URL, query included.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}://{}/", self.scheme, self.host))?;
        url.set_path(&self.raw_path);
        url.set_query(self.query.as_deref());
        Ok(url)
    }

    /// The decoded path cleaned as a rooted path, so `..` stops at `/`.
    pub fn clean_path(&self) -> String {
        path::clean(&format!("/{}", self.path.replace('\\', "/")))
    }

    /// `host/path`, the key this request has in the local mirror. The path
    /// is cleaned before the host is prefixed, so it never leaves the
    /// host's directory.
    pub fn local_key(&self) -> String {
        format!("{}{}", self.host, self.clean_path())
    }

    /// Raw path with the query string appended, as sent on the wire.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.raw_path, q),
            None => self.raw_path.clone(),
        }
    }

    /// Extension of the request path, without the dot.
    pub fn extension(&self) -> Option<&str> {
        path::extension(&self.path)
    }

    /// The same request aimed at `path/name`.
    pub fn with_index(&self, name: &str) -> Self {
        let base = self.path.trim_end_matches('/');
        let raw_base = self.raw_path.trim_end_matches('/');
        Self {
            path: format!("{base}/{name}"),
            raw_path: format!("{raw_base}/{}", utf8_percent_encode(name, SEGMENT)),
            query: None,
            ..self.clone()
        }
    }

    /// Headers suitable for forwarding upstream.
    pub fn forward_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        headers
    }
}

/// Keep `host[:port]` only when it is a single, non-dot path component.
fn sanitize_host(raw: &str) -> String {
    let host = raw.trim();
    let unusable = matches!(host, "." | "..")
        || host.contains(['/', '\\'])
        || host.parse::<axum::http::uri::Authority>().is_err();
    if unusable {
        if !host.is_empty() {
            tracing::debug!(host, "Ignoring unusable request host");
        }
        return String::new();
    }
    host.to_string()
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
