//! Error taxonomy for the index
//!
//! Every fallible operation in the crate returns [`Error`]. The variants mirror
//! the outcomes callers need to tell apart: absence, transient registry
//! trouble, malformed input, administrative blocks, integrity failures of a
//! fetched module, and the freshness coordinator's deadline. Infrastructure
//! failures (HTTP, SQLite, archives) are wrapped rather than reclassified.
//!
//! The enum is `Clone` so that one crawl outcome can be handed to every caller
//! that joined the same in-flight crawl.

use std::sync::Arc;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The registry has no such module or version.
    #[error("{0}: not found")]
    NotFound(String),

    /// The registry declined to fetch the module on demand.
    #[error("{0}: not fetched by the registry")]
    NotFetched(String),

    /// The registry timed out fetching the module upstream. Worth retrying later.
    #[error("{0}: registry timed out fetching")]
    ProxyTimedOut(String),

    #[error("invalid module path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: &'static str },

    /// The path, or one of its ancestors, is on the blocklist.
    #[error("{0}: blocked")]
    Blocked(String),

    /// The manifest declares a different module than the one requested.
    #[error("module path mismatch: requested {requested}, manifest declares {declared}")]
    PathMismatch { requested: String, declared: String },

    #[error("{module}@{version}: archive contains no packages")]
    NoPackages { module: String, version: String },

    #[error("deadline exceeded waiting for {0}")]
    DeadlineExceeded(String),

    #[error("{module}@{version}: archive is {size} bytes, limit is {limit}")]
    ArchiveTooLarge {
        module: String,
        version: String,
        size: u64,
        limit: u64,
    },

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// The import-graph admission gate is full.
    #[error("too many concurrent import graph requests")]
    Overloaded,

    #[error("registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("registry request failed")]
    Transport(#[source] Arc<reqwest::Error>),

    #[error("database error")]
    Database(#[source] Arc<sqlx::Error>),

    #[error("database migration error")]
    Migration(#[source] Arc<sqlx::migrate::MigrateError>),

    #[error("archive error")]
    Archive(#[source] Arc<zip::result::ZipError>),

    #[error("i/o error")]
    Io(#[source] Arc<std::io::Error>),

    #[error("invalid stored data")]
    Json(#[source] Arc<serde_json::Error>),

    #[error("background crawl failed: {0}")]
    Task(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// How a presentation layer should render an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Absent, blocked or malformed input.
    NotFound,
    /// Not computed yet; the client should retry shortly.
    StillWorking,
    /// Rejected by admission control.
    Busy,
    Internal,
}

impl Error {
    /// Whether the registry reported the module or version as absent, in any
    /// of its flavours.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::NotFetched(_))
    }

    /// Returns `true` if retrying later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProxyTimedOut(_) | Error::DeadlineExceeded(_) | Error::Overloaded | Error::Transport(_)
        )
    }

    pub fn response_class(&self) -> ResponseClass {
        match self {
            Error::NotFound(_)
            | Error::NotFetched(_)
            | Error::Blocked(_)
            | Error::InvalidPath { .. }
            | Error::InvalidVersion { .. } => ResponseClass::NotFound,
            Error::DeadlineExceeded(_) => ResponseClass::StillWorking,
            Error::Overloaded => ResponseClass::Busy,
            _ => ResponseClass::Internal,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(Arc::new(err))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(Arc::new(err))
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Migration(Arc::new(err))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_classes() {
        assert_eq!(Error::NotFound("m".into()).response_class(), ResponseClass::NotFound);
        assert_eq!(Error::Blocked("m".into()).response_class(), ResponseClass::NotFound);
        assert_eq!(
            Error::InvalidPath { path: "x".into(), reason: "empty" }.response_class(),
            ResponseClass::NotFound
        );
        assert_eq!(
            Error::DeadlineExceeded("m".into()).response_class(),
            ResponseClass::StillWorking
        );
        assert_eq!(Error::Overloaded.response_class(), ResponseClass::Busy);
        assert_eq!(
            Error::Status { status: 500, url: "u".into() }.response_class(),
            ResponseClass::Internal
        );
    }

    #[test]
    fn test_not_fetched_counts_as_absent() {
        assert!(Error::NotFetched("m".into()).is_not_found());
        assert!(!Error::ProxyTimedOut("m".into()).is_not_found());
        assert!(Error::ProxyTimedOut("m".into()).is_retryable());
    }
}
