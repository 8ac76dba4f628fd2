//! HTTP client for the module registry protocol
//!
//! Endpoints, for an escaped module path `P` and version `V`:
//!
//! - `{base}/{P}/@v/{V}.info` and `{base}/{P}/@latest`: version metadata
//! - `{base}/{P}/@v/{V}.mod`: the raw manifest
//! - `{base}/{P}/@v/{V}.zip`: the module archive
//! - `{base}/{P}/@v/list`: newline-delimited known versions

use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::escape::{LATEST, escape_path, escape_version};

/// Request header asking the registry not to fetch uncached modules upstream.
pub const DISABLE_FETCH_HEADER: &str = "Disable-Module-Fetch";

/// Body fragment the registry uses when an upstream fetch ran out of time.
const FETCH_TIMED_OUT: &str = "fetch timed out";

/// Version metadata returned by the info and latest endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

/// Client for one registry base URL
#[derive(Debug, Clone)]
pub struct ProxyClient {
    base_url: String,
    client: reqwest::Client,
    fetch_disabled: bool,
}

impl ProxyClient {
    /// Create a client for the registry at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let user_agent = Self::format_user_agent();
        tracing::info!("Creating registry client for {} with User-Agent: {}", base_url, user_agent);

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            fetch_disabled: false,
        })
    }

    fn format_user_agent() -> String {
        format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    /// Return a copy of this client that asks the registry not to fetch
    /// modules it has not already cached.
    pub fn with_fetch_disabled(&self, disabled: bool) -> Self {
        Self {
            fetch_disabled: disabled,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fetch_disabled(&self) -> bool {
        self.fetch_disabled
    }

    /// Resolve version metadata. `version` may be [`LATEST`].
    pub async fn info(&self, module: &str, version: &str) -> Result<VersionInfo> {
        let url = if version == LATEST {
            format!("{}/{}/@latest", self.base_url, escape_path(module)?)
        } else {
            self.version_url(module, version, "info")?
        };
        let response = self.get(&url, module, version).await?;
        Ok(response.json().await?)
    }

    /// Shorthand for `info(module, "latest")`.
    pub async fn latest(&self, module: &str) -> Result<VersionInfo> {
        self.info(module, LATEST).await
    }

    /// Every version the registry lists for the module, in registry order.
    pub async fn list_versions(&self, module: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}/@v/list", self.base_url, escape_path(module)?);
        let body = self.get(&url, module, "list").await?.text().await?;
        Ok(body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Raw manifest bytes for a resolved version
    pub async fn manifest(&self, module: &str, version: &str) -> Result<Vec<u8>> {
        let url = self.version_url(module, version, "mod")?;
        let response = self.get(&url, module, version).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Probe the archive size with a HEAD request. Returns `None` when the
    /// registry does not report a length.
    pub async fn archive_size(&self, module: &str, version: &str) -> Result<Option<u64>> {
        let url = self.version_url(module, version, "zip")?;
        tracing::debug!("HEAD {}", url);
        let response = self.request(reqwest::Method::HEAD, &url).send().await?;
        if !response.status().is_success() {
            tracing::debug!("Size probe for {} returned HTTP {}", url, response.status());
            return Ok(None);
        }
        Ok(response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()))
    }

    /// Download the archive for a resolved version, streaming the body and
    /// failing as soon as it grows past `limit`.
    pub async fn archive(&self, module: &str, version: &str, limit: Option<u64>) -> Result<Vec<u8>> {
        let url = self.version_url(module, version, "zip")?;
        let response = self.get(&url, module, version).await?;

        let too_large = |size: u64, limit: u64| Error::ArchiveTooLarge {
            module: module.to_string(),
            version: version.to_string(),
            size,
            limit,
        };
        if let (Some(limit), Some(size)) = (limit, response.content_length())
            && size > limit
        {
            return Err(too_large(size, limit));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes.extend_from_slice(&chunk);
            if let Some(limit) = limit
                && bytes.len() as u64 > limit
            {
                return Err(too_large(bytes.len() as u64, limit));
            }
        }
        tracing::debug!("Downloaded {} bytes for {}@{}", bytes.len(), module, version);
        Ok(bytes)
    }

    /// URL of a per-version endpoint. Rejects `latest`, which only the info
    /// endpoint understands.
    fn version_url(&self, module: &str, version: &str, suffix: &str) -> Result<String> {
        let allow_latest = suffix == "info";
        Ok(format!(
            "{}/{}/@v/{}.{}",
            self.base_url,
            escape_path(module)?,
            escape_version(version, allow_latest)?,
            suffix
        ))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        if self.fetch_disabled {
            builder.header(DISABLE_FETCH_HEADER, "true")
        } else {
            builder
        }
    }

    async fn get(&self, url: &str, module: &str, version: &str) -> Result<reqwest::Response> {
        tracing::debug!("GET {}", url);
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(
            status,
            &body,
            url,
            &format!("{module}@{version}"),
            self.fetch_disabled,
        ))
    }
}

/// Map a non-success registry response onto the error taxonomy.
fn classify(status: StatusCode, body: &str, url: &str, what: &str, fetch_disabled: bool) -> Error {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            if body.contains(FETCH_TIMED_OUT) {
                Error::ProxyTimedOut(what.to_string())
            } else if fetch_disabled {
                Error::NotFetched(what.to_string())
            } else {
                Error::NotFound(what.to_string())
            }
        }
        _ => Error::Status {
            status: status.as_u16(),
            url: url.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ProxyClient {
        ProxyClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_classify_not_found_flavours() {
        let url = "http://r/x";
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, "unknown revision", url, "m@v1.0.0", false),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify(StatusCode::GONE, "fetch timed out", url, "m@v1.0.0", true),
            Error::ProxyTimedOut(_)
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, "", url, "m@v1.0.0", true),
            Error::NotFetched(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "", url, "m@v1.0.0", false),
            Error::Status { status: 502, .. }
        ));
    }

    #[tokio::test]
    async fn test_latest_uses_escaped_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/github.com/!azure/sdk/@latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"Version":"v1.3.0","Time":"2023-05-01T10:00:00Z"}"#,
            ))
            .mount(&server)
            .await;

        let info = client(&server).latest("github.com/Azure/sdk").await.unwrap();
        assert_eq!(info.version, "v1.3.0");
        assert_eq!(info.time.to_rfc3339(), "2023-05-01T10:00:00+00:00");
    }

    #[tokio::test]
    async fn test_latest_rejected_for_archive() {
        let server = MockServer::start().await;
        let err = client(&server).archive("example.com/foo", LATEST, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }));
        let err = client(&server).manifest("example.com/foo", LATEST).await.unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_path_never_hits_network() {
        let server = MockServer::start().await;
        let err = client(&server).latest("not a path").await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_fetch_reports_not_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/example.com/foo/@v/list"))
            .and(header(DISABLE_FETCH_HEADER, "true"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .with_fetch_disabled(true)
            .list_versions("example.com/foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFetched(_)));
    }

    #[tokio::test]
    async fn test_list_versions_skips_blank_lines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/example.com/foo/@v/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v1.0.0\n\nv1.1.0\n"))
            .mount(&server)
            .await;

        let versions = client(&server).list_versions("example.com/foo").await.unwrap();
        assert_eq!(versions, vec!["v1.0.0", "v1.1.0"]);
    }

    #[tokio::test]
    async fn test_archive_size_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/example.com/foo/@v/v1.0.0.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.archive("example.com/foo", "v1.0.0", Some(1024)).await.unwrap_err();
        assert!(matches!(err, Error::ArchiveTooLarge { limit: 1024, .. }));

        let bytes = client.archive("example.com/foo", "v1.0.0", None).await.unwrap();
        assert_eq!(bytes.len(), 4096);
    }
}
