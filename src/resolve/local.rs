//! Local mirror lookup.
//!
//! # Responsibilities
//! - Map a request key (`host/path`) to a file under the mirror root
//! - Resolve directory-shaped requests through the index probe
//! - Read the served file fully into memory
//!
//! # Design Decisions
//! - A directory with no index is a miss; listings are never produced
//! - "Not found" is a miss, every other I/O error is surfaced

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::resolve::index::find_index;
use crate::resolve::path::{self, ResolvedPath};
use crate::resolve::types::{ContentCandidate, LocalHit, PathEscape, ResolveError};

/// Read-only view of the local mirror.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    index_names: Arc<[String]>,
}

impl LocalStore {
    /// `root` must already be absolute and clean (see [`path::normalize`]).
    pub fn new(root: impl Into<PathBuf>, index_names: Vec<String>) -> Self {
        Self {
            root: root.into(),
            index_names: index_names.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    /// Resolve a request key under the root.
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedPath, PathEscape> {
        ResolvedPath::under(&self.root, request_path)
    }

    /// Look up `request_path` (`host/path`) in the mirror.
    pub async fn lookup(&self, request_path: &str) -> Result<ContentCandidate, ResolveError> {
        let resolved = self.resolve(request_path)?;

        let candidate = match fs::metadata(resolved.as_path()).await {
            Ok(meta) if meta.is_dir() => match find_index(&resolved, &self.index_names).await {
                Some(index) => index,
                None => {
                    tracing::debug!(path = %resolved, "Directory has no index");
                    return Ok(ContentCandidate::Miss);
                }
            },
            Ok(_) => resolved,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if path::extension(request_path).is_some() {
                    return Ok(ContentCandidate::Miss);
                }
                match find_index(&resolved, &self.index_names).await {
                    Some(index) => index,
                    None => return Ok(ContentCandidate::Miss),
                }
            }
            Err(e) => return Err(io_error(&resolved, e)),
        };

        match read_file(candidate.as_path()).await {
            Ok(body) => Ok(ContentCandidate::Local(LocalHit {
                path: candidate,
                body,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ContentCandidate::Miss),
            Err(e) => Err(io_error(&candidate, e)),
        }
    }
}

fn io_error(path: &ResolvedPath, source: std::io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.to_string(),
        source,
    }
}

/// Read a whole regular file; the size is taken from an end-seek.
async fn read_file(path: &Path) -> std::io::Result<Bytes> {
    let mut file = File::open(path).await?;
    let size = file.seek(SeekFrom::End(0)).await?;
    file.seek(SeekFrom::Start(0)).await?;

    let len = usize::try_from(size)
        .map_err(|_| std::io::Error::new(ErrorKind::InvalidData, "file too large"))?;
    let mut contents = vec![0u8; len];
    file.read_exact(&mut contents).await?;
    Ok(Bytes::from(contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> LocalStore {
        LocalStore::new(root, vec!["index.html".into(), "index.htm".into()])
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn serves_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "example.com/games/a.swf", "SWF");

        match store(tmp.path()).lookup("example.com/games/a.swf").await.unwrap() {
            ContentCandidate::Local(hit) => {
                assert_eq!(&hit.body[..], b"SWF");
                assert_eq!(hit.path.as_path(), tmp.path().join("example.com/games/a.swf"));
            }
            other => panic!("expected local hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn directory_resolves_to_index_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "sub/index.htm", "htm");

        match store(tmp.path()).lookup("sub").await.unwrap() {
            ContentCandidate::Local(hit) => {
                assert_eq!(&hit.body[..], b"htm");
                assert_eq!(hit.path.extension().as_deref(), Some("htm"));
            }
            other => panic!("expected index hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn directory_without_index_is_miss() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "sub/other.txt", "x");

        let result = store(tmp.path()).lookup("sub/").await.unwrap();
        assert!(result.is_miss());
    }

    #[tokio::test]
    async fn missing_file_with_extension_is_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let result = store(tmp.path()).lookup("example.com/nope.swf").await.unwrap();
        assert!(result.is_miss());
    }

    #[tokio::test]
    async fn missing_extensionless_path_is_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let result = store(tmp.path()).lookup("example.com/nothing").await.unwrap();
        assert!(result.is_miss());
    }

    #[tokio::test]
    async fn traversal_is_clamped_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "secret.txt", "inside");

        match store(tmp.path()).lookup("a/../../../secret.txt").await.unwrap() {
            ContentCandidate::Local(hit) => assert_eq!(&hit.body[..], b"inside"),
            other => panic!("expected clamped hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_file_is_served() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "empty.txt", "");

        let result = store(tmp.path()).lookup("empty.txt").await.unwrap();
        assert_eq!(result.body().map(|b| b.len()), Some(0));
    }
}
