//! Path normalization and root containment.
//!
//! All manipulation happens on `/`-separated strings so that Windows-style and
//! POSIX-style literals of the same logical path normalize identically; the
//! result is only turned into a `PathBuf` at the end.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::resolve::types::PathEscape;

/// Base directory used when a joined path is still relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// The process's current working directory.
    WorkingDir,
    /// The directory containing the running executable.
    Executable,
}

impl Anchor {
    fn base(self) -> Option<String> {
        let dir = match self {
            Anchor::WorkingDir => std::env::current_dir().ok()?,
            Anchor::Executable => std::env::current_exe().ok()?.parent()?.to_path_buf(),
        };
        Some(slashes(&dir.to_string_lossy()).into_owned())
    }
}

/// Normalize a path or URL into an absolute, cleaned filesystem path.
///
/// - `http(s)://` URLs contribute `host[:port]/path`; a URL that fails to parse
///   is treated as a plain path.
/// - An input that is already absolute is returned as-is, without joining.
/// - A result that is still relative after joining is anchored per `anchor`.
///   If the anchor directory cannot be determined the cleaned relative path is
///   returned.
///
/// Request-derived input must go through [`ResolvedPath::under`] instead, which
/// never lets the input leave the root.
pub fn normalize(root: &str, input: &str, anchor: Anchor) -> PathBuf {
    let relative = slashes(&url_to_relative(input)).into_owned();
    let root = slashes(root);

    if is_absolute(&relative) {
        return PathBuf::from(relative);
    }

    let mut joined = join(&root, &relative);
    if !is_absolute(&joined) {
        match anchor.base() {
            Some(base) => joined = join(&base, &joined),
            None => tracing::warn!(?anchor, path = %joined, "Cannot determine anchor directory"),
        }
    }

    PathBuf::from(clean(&joined))
}

/// An absolute, cleaned filesystem path that lies under a fixed root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Resolve request-derived `input` under `root`.
    ///
    /// The input is forced relative and cleaned as a rooted path, so `..`
    /// segments stop at the root instead of climbing out of it.
    pub fn under(root: &Path, input: &str) -> Result<Self, PathEscape> {
        let relative = slashes(&url_to_relative(input)).into_owned();
        let relative = strip_volume(&relative);
        let contained = clean(&format!("/{relative}"));
        let contained = contained.trim_start_matches('/');

        let full = if contained.is_empty() {
            root.to_path_buf()
        } else {
            root.join(contained)
        };

        if !full.starts_with(root) {
            return Err(PathEscape {
                root: root.to_path_buf(),
                input: input.to_string(),
            });
        }
        Ok(Self(full))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Extension of the final component, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.file_name()?.to_string_lossy();
        extension(&name).map(str::to_string)
    }

    /// A sibling path inside this one (used for index probing).
    pub(crate) fn child(&self, name: &str) -> Self {
        Self(self.0.join(name))
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Extension of the last path segment, without the dot; `None` when empty.
pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let dot = name.rfind('.')?;
    let ext = &name[dot + 1..];
    (!ext.is_empty()).then_some(ext)
}

/// Lexically clean a `/`-separated path: collapse `.`, `..` and repeated
/// separators. `..` at the root of a rooted path is dropped.
pub fn clean(path: &str) -> String {
    let (volume, rest) = split_volume(path);
    if rest.is_empty() {
        return format!("{volume}.");
    }

    let rooted = rest.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let mut out = String::from(volume);
    if rooted {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if out.len() == volume.len() {
        out.push('.');
    }
    out
}

fn slashes(s: &str) -> Cow<'_, str> {
    if s.contains('\\') {
        Cow::Owned(s.replace('\\', "/"))
    } else {
        Cow::Borrowed(s)
    }
}

fn url_to_relative(input: &str) -> Cow<'_, str> {
    let lower = input.get(..8).unwrap_or(input).to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Cow::Borrowed(input);
    }
    match Url::parse(input) {
        Ok(url) => {
            let host = match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
                (None, _) => String::new(),
            };
            let path = percent_decode_str(url.path()).decode_utf8_lossy();
            Cow::Owned(format!("{host}{path}"))
        }
        Err(e) => {
            tracing::debug!(input, error = %e, "Unparsable URL treated as plain path");
            Cow::Borrowed(input)
        }
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || has_drive(path) && path[2..].starts_with('/')
}

fn has_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn split_volume(path: &str) -> (&str, &str) {
    if has_drive(path) {
        path.split_at(2)
    } else {
        ("", path)
    }
}

fn strip_volume(path: &str) -> &str {
    split_volume(path).1
}

/// Join non-empty elements with `/` (no cleaning).
fn join(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (false, true) => a.to_string(),
        (false, false) => format!("{}/{}", a.trim_end_matches('/'), b),
    }
}
