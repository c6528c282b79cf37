//! Directory index probing.

use tokio::fs;

use crate::resolve::path::ResolvedPath;

/// Return the first of `index_names` that exists inside `dir` as a
/// non-directory, in configured order.
pub async fn find_index(dir: &ResolvedPath, index_names: &[String]) -> Option<ResolvedPath> {
    for name in index_names {
        let candidate = dir.child(name);
        match fs::metadata(candidate.as_path()).await {
            Ok(meta) if !meta.is_dir() => return Some(candidate),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::debug!(path = %candidate, error = %e, "Index probe failed");
            }
        }
    }
    None
}
