//! On-demand read path
//!
//! A stored package is served as is; keeping it fresh is the sweeper's job.
//! A package that is not stored yet triggers a background crawl of its owning
//! module, and the caller waits for it only up to a bound. When the bound
//! elapses the caller gets [`Error::DeadlineExceeded`] while the crawl keeps
//! running and commits for whoever asks next.

use serde::Serialize;
use std::time::Duration;

use crate::analyzer::{ScanAnalyzer, SourceAnalyzer};
use crate::crawl::Crawler;
use crate::error::{Error, Result};
use crate::registry::escape::check_import_path;
use crate::registry::{STDLIB_MODULE, is_standard_import_path, path_and_ancestors};
use crate::storage::{Module, Package};

/// A package together with the module it was served from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub module: Module,
    pub package: Package,
}

pub struct FreshnessCoordinator<A: SourceAnalyzer = ScanAnalyzer> {
    crawler: Crawler<A>,
}

impl<A: SourceAnalyzer> Clone for FreshnessCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            crawler: self.crawler.clone(),
        }
    }
}

/// Module paths that could own `import_path`, most specific first.
pub fn candidate_modules(import_path: &str) -> Vec<&str> {
    if is_standard_import_path(import_path) {
        return vec![STDLIB_MODULE];
    }
    path_and_ancestors(import_path).collect()
}

impl<A: SourceAnalyzer> FreshnessCoordinator<A> {
    pub fn new(crawler: Crawler<A>) -> Self {
        Self { crawler }
    }

    pub fn crawler(&self) -> &Crawler<A> {
        &self.crawler
    }

    /// Serve the latest stored version of `import_path`, crawling its
    /// module first if nothing is stored, waiting at most `wait`.
    pub async fn get(&self, import_path: &str, platform: Option<&str>, wait: Duration) -> Result<Resolved> {
        check_import_path(import_path)?;
        let db = self.crawler.database();
        if db.is_blocked(import_path).await? {
            return Err(Error::Blocked(import_path.to_string()));
        }
        if let Some((module, package)) = db.get_package_at_latest(import_path, platform).await? {
            tracing::debug!("Serving {} from {}@{}", import_path, module.module_path, module.latest_version);
            return Ok(Resolved { module, package });
        }

        tracing::info!("{} not stored, crawling (waiting up to {:?})", import_path, wait);
        let crawler = self.crawler.clone();
        let path = import_path.to_string();
        let task = tokio::spawn(async move { crawl_owner(&crawler, &path).await });

        match tokio::time::timeout(wait, task).await {
            Err(_) => {
                tracing::info!("Gave up waiting for {} after {:?}", import_path, wait);
                Err(Error::DeadlineExceeded(import_path.to_string()))
            }
            Ok(joined) => {
                joined??;
                match db.get_package_at_latest(import_path, platform).await? {
                    Some((module, package)) => Ok(Resolved { module, package }),
                    None => Err(Error::NotFound(import_path.to_string())),
                }
            }
        }
    }
}

/// Crawl candidate modules until one of them stores `import_path`.
async fn crawl_owner<A: SourceAnalyzer>(crawler: &Crawler<A>, import_path: &str) -> Result<()> {
    for candidate in candidate_modules(import_path) {
        match crawler.crawl(candidate).await {
            Ok(module) => {
                if crawler
                    .database()
                    .has_package(import_path, &module.latest_version)
                    .await?
                {
                    return Ok(());
                }
                tracing::debug!("{} does not contain {}", candidate, import_path);
            }
            Err(e @ (Error::NotFound(_) | Error::NotFetched(_) | Error::InvalidPath { .. })) => {
                tracing::debug!("Candidate module {} skipped: {}", candidate, e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::NotFound(import_path.to_string()))
}
