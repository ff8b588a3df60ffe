//! Display path normalisation.
//!
//! Display paths are purely virtual (`/photos/2024`): they organise listings
//! and never reach a provider. They are always `/`-separated regardless of
//! platform.

use crate::error::{ErrorKind, Result};

/// Normalise a declared display path to `/a/b` form.
///
/// Empty segments and `.` are dropped and `..` pops the previous segment.
/// Climbing above the root and NUL bytes are rejected. An empty path is the
/// root, `/`.
///
/// # Examples
///
/// ```
/// use colossus_pool::normalize_path;
///
/// assert_eq!(normalize_path("").unwrap(), "/");
/// assert_eq!(normalize_path("photos//2024/./").unwrap(), "/photos/2024");
/// assert_eq!(normalize_path("/a/b/../c").unwrap(), "/a/c");
/// assert!(normalize_path("/../etc").is_err());
/// ```
pub fn normalize(path: &str) -> Result<String> {
    if path.contains('\0') {
        exn::bail!(ErrorKind::InvalidInput(format!("path contains a NUL byte: {path:?}")));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidInput(format!("path leaves the root: {path:?}")));
                }
            },
            segment => segments.push(segment),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}
