//! Version precedence and module series paths

use std::cmp::Ordering;

/// Parse a `v`-prefixed semantic version.
pub fn parse(version: &str) -> Option<semver::Version> {
    let rest = version.strip_prefix('v')?;
    semver::Version::parse(rest).ok()
}

/// Compare two versions by semantic precedence, ignoring build metadata.
/// Unparseable versions sort below every valid one.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp_precedence(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Whether the version is a pre-release (pseudo-versions included).
pub fn is_prerelease(version: &str) -> bool {
    parse(version).is_some_and(|v| !v.pre.is_empty())
}

/// Sort versions by descending precedence, dropping duplicates and anything
/// that does not parse.
pub fn sort_descending(versions: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut valid: Vec<String> = versions
        .into_iter()
        .filter(|v| {
            let ok = parse(v).is_some();
            if !ok {
                tracing::warn!("Dropping unparseable version {:?}", v);
            }
            ok
        })
        .collect();
    valid.sort_by(|a, b| compare(b, a));
    valid.dedup_by(|a, b| compare(a, b) == Ordering::Equal);
    valid
}

/// Module path with its major-version suffix removed, so that `example.com/m`
/// and `example.com/m/v3` share a series.
pub fn series_path(module_path: &str) -> String {
    if let Some(rest) = module_path.strip_prefix("gopkg.in/") {
        if let Some((base, major)) = rest.rsplit_once(".v")
            && is_major(major)
        {
            return format!("gopkg.in/{base}");
        }
        return module_path.to_string();
    }
    if let Some((base, last)) = module_path.rsplit_once('/')
        && let Some(major) = last.strip_prefix('v')
        && is_major(major)
        && major != "0"
        && major != "1"
    {
        return base.to_string();
    }
    module_path.to_string()
}

fn is_major(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) && !(s.len() > 1 && s.starts_with('0'))
}
