//! Runtime crawl state of a module path

use serde::Serialize;
use std::fmt;

/// Derived from storage plus the in-flight crawl registry; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "version", rename_all = "snake_case")]
pub enum CrawlState {
    /// No module row and no crawl running.
    Unknown,
    /// A crawl is running in this process.
    Fetching,
    /// Stored at the given version.
    Present(String),
    /// The path or an ancestor is blocked.
    Blocked,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlState::Unknown => f.write_str("unknown"),
            CrawlState::Fetching => f.write_str("fetching"),
            CrawlState::Present(version) => write!(f, "present@{version}"),
            CrawlState::Blocked => f.write_str("blocked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization() {
        assert_eq!(
            serde_json::to_string(&CrawlState::Present("v1.0.0".into())).unwrap(),
            r#"{"state":"present","version":"v1.0.0"}"#
        );
        assert_eq!(serde_json::to_string(&CrawlState::Blocked).unwrap(), r#"{"state":"blocked"}"#);
        assert_eq!(CrawlState::Fetching.to_string(), "fetching");
    }
}
