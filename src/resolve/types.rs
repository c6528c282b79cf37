//! Candidate and error types shared by the resolution stages.

use std::path::PathBuf;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use thiserror::Error;

use crate::resolve::path::ResolvedPath;

/// A request-derived path would have resolved outside the configured root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path {input:?} escapes root {}", root.display())]
pub struct PathEscape {
    pub root: PathBuf,
    pub input: String,
}

/// Errors that abort a lookup. Misses are not errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Local I/O failure other than "not found".
    #[error("local I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    PathEscape(#[from] PathEscape),
}

/// Why a single remote attempt produced no content.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Origin answered with something other than `200 OK`.
    #[error("origin answered {0}")]
    Status(StatusCode),

    /// Connection, TLS, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The outbound URL could not be built.
    #[error("invalid origin URL {0:?}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Metric/log label.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Status(_) => "status",
            FetchError::Transport(_) => "transport",
            FetchError::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// A file served from the local mirror.
#[derive(Debug, Clone)]
pub struct LocalHit {
    /// The file actually served (may be an index file).
    pub path: ResolvedPath,
    /// Full file contents.
    pub body: Bytes,
}

/// A successful remote fetch.
#[derive(Debug, Clone)]
pub struct RemoteHit {
    /// Origin URL that answered.
    pub url: String,
    pub status: StatusCode,
    /// Response headers, annotated with the local filename.
    pub headers: HeaderMap,
    /// Buffered body; unaffected by the cache fill.
    pub body: Bytes,
    /// Local path the body was written to, `None` if the cache fill failed.
    pub persisted: Option<ResolvedPath>,
}

/// Outcome of a lookup: exactly one per request.
#[derive(Debug, Clone)]
pub enum ContentCandidate {
    Local(LocalHit),
    Remote(RemoteHit),
    Miss,
}

impl ContentCandidate {
    pub fn is_miss(&self) -> bool {
        matches!(self, ContentCandidate::Miss)
    }

    /// Body of a hit.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            ContentCandidate::Local(hit) => Some(&hit.body),
            ContentCandidate::Remote(hit) => Some(&hit.body),
            ContentCandidate::Miss => None,
        }
    }
}

/// Terminal state of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    Local,
    RemoteLive,
    RemoteMirror,
    NotFound,
}

impl Served {
    pub fn as_str(&self) -> &'static str {
        match self {
            Served::Local => "local",
            Served::RemoteLive => "live",
            Served::RemoteMirror => "mirror",
            Served::NotFound => "not_found",
        }
    }
}
