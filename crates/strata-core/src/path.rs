//! Logical path canonicalization and helpers.
//!
//! Logical paths are absolute, `/`-delimited, UTF-8 strings. A trailing
//! slash distinguishes a directory reference from a file reference. These
//! helpers are pure and total; they never touch I/O.

use crate::error::{EngineError, Result};

/// Canonicalize a logical path.
///
/// Ensures a leading `/`, collapses runs of `/`, and, when `directory` is
/// true, appends a trailing `/` if missing. Rejects `..` segments.
pub fn normalize(path: &str, directory: bool) -> Result<String> {
    if path.contains("..") {
        return Err(EngineError::bad_request(format!(
            "path must not contain '..' segments: {path}"
        )));
    }

    let had_trailing = path.ends_with('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut out = String::with_capacity(path.len() + 2);
    out.push('/');
    for (i, seg) in segments.iter().enumerate() {
        out.push_str(seg);
        if i + 1 < segments.len() {
            out.push('/');
        }
    }

    if (directory || had_trailing) && !out.ends_with('/') {
        out.push('/');
    }
    Ok(out)
}

/// True if the path is a directory reference (trailing slash).
pub fn is_directory_ref(path: &str) -> bool {
    path.ends_with('/')
}

/// The containing directory of a path, always in directory form.
///
/// Returns `None` for the root.
pub fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(format!("{}/", &trimmed[..idx])),
        None => None,
    }
}

/// The final segment of a path, without any trailing slash.
///
/// The root has an empty basename.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a base path and a relative segment with exactly one slash.
pub fn join(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Every directory from the containing directory of `path` up to the root,
/// in directory form, nearest first.
///
/// For a directory reference the walk starts at the path itself. The root
/// `/` is always the last element.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = if is_directory_ref(path) {
        path.to_string()
    } else {
        match parent_of(path) {
            Some(p) => p,
            None => return vec!["/".to_string()],
        }
    };

    loop {
        chain.push(current.clone());
        if current == "/" {
            break;
        }
        match parent_of(&current) {
            Some(p) => current = p,
            None => break,
        }
    }
    chain
}

/// Strip a mount prefix from a logical path, yielding the sub-path with a
/// leading `/`. A trailing slash on the input survives.
pub fn strip_prefix(path: &str, prefix: &str) -> Option<String> {
    let prefix_trim = prefix.trim_end_matches('/');
    if prefix_trim.is_empty() {
        return Some(path.to_string());
    }
    if path == prefix_trim {
        return Some("/".to_string());
    }
    path.strip_prefix(prefix_trim).and_then(|rest| {
        if rest.starts_with('/') {
            Some(rest.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_slashes() {
        assert_eq!(normalize("//a///b", false).unwrap(), "/a/b");
        assert_eq!(normalize("a/b", false).unwrap(), "/a/b");
        assert_eq!(normalize("", false).unwrap(), "/");
        assert_eq!(normalize("/", true).unwrap(), "/");
    }

    #[test]
    fn test_normalize_directory_ref() {
        assert_eq!(normalize("/a/b", true).unwrap(), "/a/b/");
        assert_eq!(normalize("/a/b/", false).unwrap(), "/a/b/");
        assert_eq!(normalize("/a/b", false).unwrap(), "/a/b");
    }

    #[test]
    fn test_normalize_rejects_dotdot() {
        assert!(normalize("/a/../b", false).is_err());
        assert!(normalize("..", false).is_err());
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a/b/c.txt").as_deref(), Some("/a/b/"));
        assert_eq!(parent_of("/a/b/").as_deref(), Some("/a/"));
        assert_eq!(parent_of("/a").as_deref(), Some("/"));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(basename("/a/b/"), "b");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/a/", "b"), "/a/b");
        assert_eq!(join("/", "b"), "/b");
        assert_eq!(join("/a", "/b/"), "/a/b/");
    }

    #[test]
    fn test_ancestors_of_file() {
        assert_eq!(ancestors("/a/b/c.txt"), vec!["/a/b/", "/a/", "/"]);
    }

    #[test]
    fn test_ancestors_of_directory() {
        assert_eq!(ancestors("/a/b/"), vec!["/a/b/", "/a/", "/"]);
        assert_eq!(ancestors("/"), vec!["/"]);
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("/docs/a/x.txt", "/docs").as_deref(), Some("/a/x.txt"));
        assert_eq!(strip_prefix("/docs/", "/docs").as_deref(), Some("/"));
        assert_eq!(strip_prefix("/docs", "/docs").as_deref(), Some("/"));
        assert_eq!(strip_prefix("/docs2/a", "/docs"), None);
        assert_eq!(strip_prefix("/a/b/", "/"), Some("/a/b/".to_string()));
    }
}
