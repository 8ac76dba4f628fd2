//! Query surface over the index
//!
//! [`IndexService`] ties the crawler, the freshness coordinator and the graph
//! builder to one database and is what presentation layers (the CLI here)
//! talk to.

use serde::Serialize;
use std::time::Duration;

use crate::analyzer::{Documentation, ScanAnalyzer, SourceAnalyzer};
use crate::config::Config;
use crate::crawl::{CrawlState, Crawler};
use crate::error::{Error, Result};
use crate::freshness::{FreshnessCoordinator, Resolved};
use crate::graph::{DepLevel, GraphBuilder, ImportGraph};
use crate::registry::LATEST;
use crate::registry::escape::{check_import_path, check_module_path, check_version};
use crate::storage::{Database, Module, Package, PackageSummary, ProjectMeta, SearchHit};
use crate::sweeper::Sweeper;

/// A resolved package with its decoded documentation and source links.
#[derive(Debug, Clone, Serialize)]
pub struct PackagePage<D> {
    pub module: Module,
    pub package: Package,
    pub documentation: D,
    pub project: Option<ProjectMeta>,
}

pub struct IndexService<A: SourceAnalyzer = ScanAnalyzer> {
    freshness: FreshnessCoordinator<A>,
    graphs: GraphBuilder<Database>,
    default_wait: Duration,
    sweep_interval: Duration,
}

impl<A: SourceAnalyzer> Clone for IndexService<A> {
    fn clone(&self) -> Self {
        Self {
            freshness: self.freshness.clone(),
            graphs: self.graphs.clone(),
            default_wait: self.default_wait,
            sweep_interval: self.sweep_interval,
        }
    }
}

impl IndexService {
    /// Open the configured database and build a service around the default
    /// declaration-scanning analyzer.
    pub async fn open(config: &Config) -> Result<Self> {
        let path = config.database_file()?;
        let db = Database::connect(&path).await?;
        Self::new(db, config, ScanAnalyzer)
    }
}

impl<A: SourceAnalyzer> IndexService<A> {
    pub fn new(db: Database, config: &Config, analyzer: A) -> Result<Self> {
        let graphs = GraphBuilder::new(db.clone(), config.graph_concurrency);
        let crawler = Crawler::new(db, config, analyzer)?;
        Ok(Self {
            freshness: FreshnessCoordinator::new(crawler),
            graphs,
            default_wait: config.crawl_wait(),
            sweep_interval: config.sweep_interval(),
        })
    }

    pub fn crawler(&self) -> &Crawler<A> {
        self.freshness.crawler()
    }

    pub fn database(&self) -> &Database {
        self.crawler().database()
    }

    pub fn sweeper(&self) -> Sweeper<A> {
        Sweeper::new(self.crawler().clone())
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Get a package at `version`, or at the latest stored version when
    /// `version` is `None` or `latest`. Only the latest lookup crawls on a
    /// miss; it waits `wait` (the configured default when `None`).
    pub async fn get_package(
        &self,
        import_path: &str,
        version: Option<&str>,
        platform: Option<&str>,
        wait: Option<Duration>,
    ) -> Result<Resolved> {
        let version = version.unwrap_or(LATEST);
        if version == LATEST {
            return self
                .freshness
                .get(import_path, platform, wait.unwrap_or(self.default_wait))
                .await;
        }

        check_import_path(import_path)?;
        check_version(version, false)?;
        let db = self.database();
        if db.is_blocked(import_path).await? {
            return Err(Error::Blocked(import_path.to_string()));
        }
        let package = db
            .get_package(import_path, version, platform)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{import_path}@{version}")))?;
        let module = db
            .get_module(&package.module_path)
            .await?
            .ok_or_else(|| Error::NotFound(package.module_path.clone()))?;
        Ok(Resolved { module, package })
    }

    /// Like [`Self::get_package`], with the documentation decoded and the
    /// module's source links attached.
    pub async fn get_page(
        &self,
        import_path: &str,
        version: Option<&str>,
        platform: Option<&str>,
        wait: Option<Duration>,
    ) -> Result<PackagePage<A::Doc>> {
        let Resolved { module, package } = self.get_package(import_path, version, platform, wait).await?;
        let documentation = <A::Doc as Documentation>::decode(&package.documentation)?;
        let project = self.database().get_project(&module.module_path).await?;
        Ok(PackagePage {
            module,
            package,
            documentation,
            project,
        })
    }

    pub async fn get_module(&self, module_path: &str) -> Result<Module> {
        check_module_path(module_path)?;
        let db = self.database();
        if db.is_blocked(module_path).await? {
            return Err(Error::Blocked(module_path.to_string()));
        }
        db.get_module(module_path)
            .await?
            .ok_or_else(|| Error::NotFound(module_path.to_string()))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.database().search(query).await
    }

    /// Packages of a module version under `prefix` (the module root when
    /// `None`).
    pub async fn sub_packages(
        &self,
        module_path: &str,
        version: &str,
        prefix: Option<&str>,
        include_internal: bool,
    ) -> Result<Vec<PackageSummary>> {
        check_module_path(module_path)?;
        check_version(version, false)?;
        self.database()
            .sub_packages(module_path, version, prefix, include_internal)
            .await
    }

    pub async fn importers(&self, import_path: &str) -> Result<Vec<PackageSummary>> {
        check_import_path(import_path)?;
        self.database().importers(import_path).await
    }

    /// Import graph of a stored package at its latest stored version.
    pub async fn import_graph(&self, import_path: &str, level: DepLevel) -> Result<ImportGraph> {
        check_import_path(import_path)?;
        let (_, package) = self
            .database()
            .get_package_at_latest(import_path, None)
            .await?
            .ok_or_else(|| Error::NotFound(import_path.to_string()))?;
        self.graphs.build(import_path, package.imports, level).await
    }

    pub async fn crawl(&self, module_path: &str) -> Result<Module> {
        self.crawler().crawl(module_path).await
    }

    pub async fn crawl_state(&self, module_path: &str) -> Result<CrawlState> {
        self.crawler().state(module_path).await
    }

    pub async fn is_blocked(&self, path: &str) -> Result<bool> {
        self.database().is_blocked(path).await
    }

    pub async fn block(&self, prefix: &str) -> Result<()> {
        check_import_path(prefix)?;
        self.database().block(prefix).await
    }

    pub async fn unblock(&self, prefix: &str) -> Result<bool> {
        self.database().unblock(prefix).await
    }

    pub async fn close(&self) {
        self.database().close().await;
    }
}
