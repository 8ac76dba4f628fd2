//! Module registry protocol
//!
//! The registry serves version metadata, manifests and archives for module
//! paths. This module holds the HTTP client plus the path/version rules that
//! decide what may be sent to it.

pub mod client;
pub mod escape;
pub mod version;

pub use client::{ProxyClient, VersionInfo};
pub use escape::LATEST;

/// Module path under which the standard library is indexed.
pub const STDLIB_MODULE: &str = "std";

/// Whether an import path belongs to the standard library. Standard library
/// paths are the only ones whose first element carries no dot.
pub fn is_standard_import_path(path: &str) -> bool {
    if path == STDLIB_MODULE {
        return true;
    }
    let first = path.split('/').next().unwrap_or_default();
    !first.is_empty() && !first.contains('.')
}

/// Yield `path` and each of its slash-delimited ancestors, longest first.
pub fn path_and_ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(path);
    std::iter::from_fn(move || {
        let current = next?;
        next = current.rfind('/').map(|i| &current[..i]);
        Some(current)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_import_paths() {
        assert!(is_standard_import_path("fmt"));
        assert!(is_standard_import_path("net/http"));
        assert!(is_standard_import_path("std"));
        assert!(!is_standard_import_path("example.com/foo"));
        assert!(!is_standard_import_path(""));
    }

    #[test]
    fn test_ancestors_longest_first() {
        let all: Vec<_> = path_and_ancestors("a.com/b/c").collect();
        assert_eq!(all, vec!["a.com/b/c", "a.com/b", "a.com"]);
        assert_eq!(path_and_ancestors("fmt").count(), 1);
    }
}
