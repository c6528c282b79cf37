//! Content-Type negotiation for outgoing responses.
//!
//! Precedence, first applicable wins:
//! 1. extension of the request path
//! 2. extension of the local file actually served
//! 3. the table's `default` entry, only when upstream set no Content-Type

use axum::http::{header, HeaderMap, HeaderValue};

use crate::config::MimeTable;
use crate::resolve::path;

/// Decide the Content-Type for a response, or `None` to leave it untouched.
pub fn decide(
    request_path: &str,
    resolved_filename: Option<&str>,
    table: &MimeTable,
    has_content_type: bool,
) -> Option<String> {
    let by_request = path::extension(request_path).and_then(|ext| table.get(ext));
    let by_file = || {
        resolved_filename
            .and_then(path::extension)
            .and_then(|ext| table.get(ext))
    };
    let by_default = || {
        if has_content_type {
            None
        } else {
            table.default_type()
        }
    };

    by_request
        .or_else(by_file)
        .or_else(by_default)
        .map(str::to_string)
}

/// Apply [`decide`] to a response header map in place.
pub fn negotiate(
    headers: &mut HeaderMap,
    request_path: &str,
    resolved_filename: Option<&str>,
    table: &MimeTable,
) {
    let has_content_type = headers.contains_key(header::CONTENT_TYPE);
    let Some(mime) = decide(request_path, resolved_filename, table, has_content_type) else {
        return;
    };
    match HeaderValue::from_str(&mime) {
        Ok(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Err(_) => tracing::warn!(mime = %mime, "Ignoring unrepresentable MIME type"),
    }
}
