//! Module path and version validation, plus the registry's case-folding escape
//!
//! Registries serve case-insensitive file systems, so every uppercase letter in
//! a path or version is sent as `!` followed by the lowercase letter. Inputs
//! that already contain `!` are rejected rather than double-escaped.

use crate::error::{Error, Result};
use crate::registry::STDLIB_MODULE;

/// Sentinel accepted in place of a version by the version-info endpoint.
pub const LATEST: &str = "latest";

fn invalid_path(path: &str, reason: &'static str) -> Error {
    Error::InvalidPath { path: path.to_string(), reason }
}

fn invalid_version(version: &str, reason: &'static str) -> Error {
    Error::InvalidVersion { version: version.to_string(), reason }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '+')
}

/// Validate a module path before it is embedded in a request URL.
pub fn check_module_path(path: &str) -> Result<()> {
    if path == STDLIB_MODULE {
        return Ok(());
    }
    check_elements(path)?;
    let first = path.split('/').next().unwrap_or_default();
    if !first.contains('.') {
        return Err(invalid_path(path, "missing dot in first path element"));
    }
    if first.starts_with('-') {
        return Err(invalid_path(path, "leading dash in first path element"));
    }
    Ok(())
}

/// Validate an import path. Unlike module paths, standard library import
/// paths have no dot in their first element.
pub fn check_import_path(path: &str) -> Result<()> {
    check_elements(path)
}

fn check_elements(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid_path(path, "empty path"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(invalid_path(path, "leading or trailing slash"));
    }
    for element in path.split('/') {
        if element.is_empty() {
            return Err(invalid_path(path, "empty path element"));
        }
        if element.starts_with('.') || element.ends_with('.') {
            return Err(invalid_path(path, "path element begins or ends with a dot"));
        }
        if !element.chars().all(is_path_char) {
            return Err(invalid_path(path, "invalid character"));
        }
    }
    Ok(())
}

/// Validate a version string. `latest` is accepted only when `allow_latest` is set.
pub fn check_version(version: &str, allow_latest: bool) -> Result<()> {
    if version == LATEST {
        if allow_latest {
            return Ok(());
        }
        return Err(invalid_version(version, "latest is only valid for version queries"));
    }
    if version.contains('!') {
        return Err(invalid_version(version, "contains escape marker"));
    }
    if crate::registry::version::parse(version).is_none() {
        return Err(invalid_version(version, "not a semantic version"));
    }
    Ok(())
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Check and escape a module path for use in a registry URL.
pub fn escape_path(path: &str) -> Result<String> {
    check_module_path(path)?;
    Ok(escape(path))
}

/// Check and escape a version for use in a registry URL.
pub fn escape_version(version: &str, allow_latest: bool) -> Result<String> {
    check_version(version, allow_latest)?;
    Ok(escape(version))
}

/// Inverse of the case-folding escape. Returns `None` for malformed input.
pub fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut bang = false;
    for c in s.chars() {
        if bang {
            if !c.is_ascii_lowercase() {
                return None;
            }
            out.push(c.to_ascii_uppercase());
            bang = false;
        } else if c == '!' {
            bang = true;
        } else if c.is_ascii_uppercase() {
            return None;
        } else {
            out.push(c);
        }
    }
    (!bang).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_uppercase() {
        assert_eq!(escape_path("github.com/Azure/go-SDK").unwrap(), "github.com/!azure/go-!s!d!k");
        assert_eq!(escape_path("example.com/foo").unwrap(), "example.com/foo");
        assert_eq!(escape_version("v1.0.0-RC1", false).unwrap(), "v1.0.0-!r!c1");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("github.com/!azure").as_deref(), Some("github.com/Azure"));
        assert_eq!(unescape("bad!"), None);
        assert_eq!(unescape("bad!X"), None);
        assert_eq!(unescape("Upper"), None);
    }

    #[test]
    fn test_invalid_paths_fail_fast() {
        for path in [
            "",
            "/example.com",
            "example.com/",
            "example.com//foo",
            "example.com/.hidden",
            "example.com/foo bar",
            "example.com/f!oo",
            "nodot/foo",
            "example.com/../etc",
        ] {
            assert!(
                matches!(check_module_path(path), Err(Error::InvalidPath { .. })),
                "{path:?} should be rejected"
            );
        }
        assert!(check_module_path(STDLIB_MODULE).is_ok());
        assert!(check_module_path("gopkg.in/yaml.v3").is_ok());
    }

    #[test]
    fn test_import_paths_allow_standard_library() {
        assert!(check_import_path("net/http").is_ok());
        assert!(check_module_path("net/http").is_err());
        assert!(check_import_path("net//http").is_err());
        assert!(check_import_path("").is_err());
    }

    #[test]
    fn test_latest_only_where_allowed() {
        assert!(check_version(LATEST, true).is_ok());
        assert!(matches!(check_version(LATEST, false), Err(Error::InvalidVersion { .. })));
        assert!(matches!(check_version("1.0.0", false), Err(Error::InvalidVersion { .. })));
        assert!(check_version("v2.0.0+incompatible", false).is_ok());
    }
}
