//! Version resolution for the standard library module
//!
//! The standard library has no `@latest` endpoint. Its latest version is the
//! highest release (pre-releases excluded) in its version list.

use crate::error::{Error, Result};
use crate::registry::version::{compare, is_prerelease, parse};
use crate::registry::{ProxyClient, STDLIB_MODULE, VersionInfo};

/// Pick the highest release from a version list.
pub fn latest_release(versions: &[String]) -> Option<&str> {
    versions
        .iter()
        .filter(|v| parse(v).is_some() && !is_prerelease(v))
        .max_by(|a, b| compare(a, b))
        .map(String::as_str)
}

pub async fn resolve_latest(client: &ProxyClient) -> Result<VersionInfo> {
    let versions = client.list_versions(STDLIB_MODULE).await?;
    let latest = latest_release(&versions)
        .ok_or_else(|| Error::NotFound(format!("{STDLIB_MODULE}@latest")))?;
    tracing::debug!("Resolved standard library to {}", latest);
    client.info(STDLIB_MODULE, latest).await
}
