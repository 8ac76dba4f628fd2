//! Crawl orchestration
//!
//! A crawl resolves a module's latest version, fetches and extracts its
//! archive, runs the analyzer over every package and commits the result.
//! Crawls for the same module path are de-duplicated: a caller arriving while
//! one is running joins it and receives the same outcome.

pub mod project;
pub mod state;
pub mod stdlib;

pub use project::ProjectDiscovery;
pub use state::CrawlState;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;

use crate::analyzer::{Documentation, Platform, ScanAnalyzer, SourceAnalyzer, encode_bounded};
use crate::archive::{ExtractedPackage, Manifest, extract_packages};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::escape::check_module_path;
use crate::registry::{ProxyClient, STDLIB_MODULE, VersionInfo, version};
use crate::storage::{
    Database, Module, NewPackage, PlatformDoc, from_millis, now_millis, package_score,
};

/// Age after which project metadata is rediscovered even if the module did
/// not change.
pub const PROJECT_MAX_AGE_HOURS: i64 = 24;

type SharedCrawl = Shared<BoxFuture<'static, Result<Module>>>;

/// Drives crawls and owns the in-flight crawl registry.
pub struct Crawler<A: SourceAnalyzer = ScanAnalyzer> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    db: Database,
    registry: ProxyClient,
    stdlib_registry: ProxyClient,
    analyzer: Arc<A>,
    platforms: Vec<Platform>,
    max_archive_size: Option<u64>,
    max_doc_size: usize,
    projects: ProjectDiscovery,
    in_flight: DashMap<String, SharedCrawl>,
}

impl<A: SourceAnalyzer> Clone for Crawler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: SourceAnalyzer> Crawler<A> {
    pub fn new(db: Database, config: &Config, analyzer: A) -> Result<Self> {
        let registry = ProxyClient::new(&config.registry_url, config.request_timeout())?
            .with_fetch_disabled(config.fetch_disabled);
        let stdlib_registry = ProxyClient::new(config.stdlib_registry(), config.request_timeout())?;
        let projects = ProjectDiscovery::new(config.request_timeout(), config.discover_project_sources)?;
        Ok(Self {
            inner: Arc::new(Inner {
                db,
                registry,
                stdlib_registry,
                analyzer: Arc::new(analyzer),
                platforms: config.platform_list(),
                max_archive_size: config.max_archive_size,
                max_doc_size: config.max_doc_size,
                projects,
                in_flight: DashMap::new(),
            }),
        })
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.inner.platforms
    }

    fn registry_for(&self, module_path: &str) -> &ProxyClient {
        if module_path == STDLIB_MODULE {
            &self.inner.stdlib_registry
        } else {
            &self.inner.registry
        }
    }

    /// Current crawl state of a module path.
    pub async fn state(&self, module_path: &str) -> Result<CrawlState> {
        if self.inner.db.is_blocked(module_path).await? {
            return Ok(CrawlState::Blocked);
        }
        if self.inner.in_flight.contains_key(module_path) {
            return Ok(CrawlState::Fetching);
        }
        Ok(match self.inner.db.get_module(module_path).await? {
            Some(module) => CrawlState::Present(module.latest_version),
            None => CrawlState::Unknown,
        })
    }

    /// Crawl a module, joining a crawl already running for the same path.
    ///
    /// The crawl runs on its own task: dropping the returned future detaches
    /// the caller but lets the crawl finish and commit.
    pub async fn crawl(&self, module_path: &str) -> Result<Module> {
        let shared = match self.inner.in_flight.entry(module_path.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Joining in-flight crawl of {}", module_path);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let this = self.clone();
                let path = module_path.to_string();
                let handle = tokio::spawn(async move {
                    let result = this.crawl_module(&path).await;
                    this.inner.in_flight.remove(&path);
                    result
                });
                let shared = async move { handle.await.unwrap_or_else(|e| Err(Error::from(e))) }
                    .boxed()
                    .shared();
                entry.insert(shared.clone());
                shared
            }
        };
        shared.await
    }

    async fn resolve(&self, module_path: &str) -> Result<VersionInfo> {
        let registry = self.registry_for(module_path);
        if module_path == STDLIB_MODULE {
            stdlib::resolve_latest(registry).await
        } else {
            registry.latest(module_path).await
        }
    }

    async fn crawl_module(&self, module_path: &str) -> Result<Module> {
        check_module_path(module_path)?;
        let db = &self.inner.db;
        if db.is_blocked(module_path).await? {
            return Err(Error::Blocked(module_path.to_string()));
        }

        let info = self.resolve(module_path).await?;
        if let Some(mut existing) = db.get_module(module_path).await?
            && existing.latest_version == info.version
        {
            if let Some(updated_at) = db.touch_module(module_path).await? {
                existing.updated_at = updated_at;
            }
            tracing::info!("{}@{} unchanged, refreshed timestamp", module_path, info.version);
            if self.project_is_stale(module_path).await? {
                self.refresh_project(module_path).await;
            }
            return Ok(existing);
        }

        tracing::info!("Crawling {}@{}", module_path, info.version);
        let registry = self.registry_for(module_path);
        let versions = version::sort_descending(registry.list_versions(module_path).await?);

        let manifest = Manifest::parse(&registry.manifest(module_path, &info.version).await?)?;
        if manifest.module_path != module_path {
            return Err(Error::PathMismatch {
                requested: module_path.to_string(),
                declared: manifest.module_path,
            });
        }

        let limit = self.inner.max_archive_size;
        if let Some(limit) = limit
            && let Some(size) = registry.archive_size(module_path, &info.version).await?
            && size > limit
        {
            return Err(Error::ArchiveTooLarge {
                module: module_path.to_string(),
                version: info.version.clone(),
                size,
                limit,
            });
        }
        let archive = registry.archive(module_path, &info.version, limit).await?;
        let packages = extract_packages(&archive, module_path, &info.version)?;
        if packages.is_empty() {
            return Err(Error::NoPackages {
                module: module_path.to_string(),
                version: info.version.clone(),
            });
        }
        let mut allowed = Vec::with_capacity(packages.len());
        for extracted in packages {
            if db.is_blocked(&extracted.import_path).await? {
                tracing::info!("Skipping blocked package {}", extracted.import_path);
            } else {
                allowed.push(extracted);
            }
        }

        let module = Module {
            module_path: module_path.to_string(),
            series_path: version::series_path(module_path),
            latest_version: info.version.clone(),
            // The resolved version may be a pseudo-version missing from the list.
            versions: trim_above(versions, &info.version),
            deprecated: manifest.deprecated,
            commit_time: from_millis(info.time.timestamp_millis()),
            updated_at: from_millis(now_millis()),
        };
        db.upsert_module(&module).await?;

        let total = allowed.len();
        let mut stored = 0;
        for extracted in allowed {
            if let Some(package) = self.analyze(&module, extracted).await? {
                db.upsert_package(&package).await?;
                stored += 1;
            }
        }
        tracing::info!(
            "Crawled {}@{}: stored {} of {} packages",
            module_path,
            info.version,
            stored,
            total
        );

        self.refresh_project(module_path).await;
        Ok(module)
    }

    /// Analyze one package for every configured platform. Returns `None`
    /// when no platform produced documentation.
    async fn analyze(&self, module: &Module, extracted: ExtractedPackage) -> Result<Option<NewPackage>> {
        let analyzer = Arc::clone(&self.inner.analyzer);
        let platforms = self.inner.platforms.clone();
        let max_doc_size = self.inner.max_doc_size;
        let import_path = extracted.import_path.clone();

        let docs = tokio::task::spawn_blocking(move || {
            analyze_platforms(analyzer.as_ref(), &extracted, &platforms, max_doc_size)
        })
        .await?;

        if docs.is_empty() {
            tracing::warn!("Skipping {}@{}: no platform could be analyzed", import_path, module.latest_version);
            return Ok(None);
        }
        Ok(Some(NewPackage {
            import_path,
            module_path: module.module_path.clone(),
            version: module.latest_version.clone(),
            commit_time: module.commit_time,
            platforms: docs,
        }))
    }

    /// Project metadata keeps its own timestamp and is refreshed on an
    /// unchanged crawl once it is missing or older than [`PROJECT_MAX_AGE_HOURS`].
    async fn project_is_stale(&self, module_path: &str) -> Result<bool> {
        let max_age = chrono::Duration::hours(PROJECT_MAX_AGE_HOURS);
        Ok(match self.inner.db.get_project(module_path).await? {
            Some(meta) => chrono::Utc::now() - meta.updated_at > max_age,
            None => true,
        })
    }

    async fn refresh_project(&self, module_path: &str) {
        match self.inner.projects.discover(module_path).await {
            Ok(Some(meta)) => {
                if let Err(e) = self.inner.db.put_project(&meta).await {
                    tracing::warn!("Failed to store project metadata for {}: {}", module_path, e);
                }
            }
            Ok(None) => tracing::debug!("No project metadata for {}", module_path),
            Err(e) => tracing::warn!("Project metadata for {} unavailable: {}", module_path, e),
        }
    }
}

/// Put `latest` at the head of a descending version list, dropping every
/// listed version that does not sort strictly below it.
fn trim_above(versions: Vec<String>, latest: &str) -> Vec<String> {
    std::iter::once(latest.to_string())
        .chain(versions.into_iter().filter(|v| version::compare(v, latest).is_lt()))
        .collect()
}

fn analyze_platforms<A: SourceAnalyzer>(
    analyzer: &A,
    extracted: &ExtractedPackage,
    platforms: &[Platform],
    max_doc_size: usize,
) -> Vec<PlatformDoc> {
    let mut docs = Vec::new();
    for (rank, platform) in platforms.iter().enumerate() {
        let mut doc = match analyzer.analyze(&extracted.import_path, &extracted.files, platform) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("Analyzing {} for {} failed: {:#}", extracted.import_path, platform, e);
                continue;
            }
        };
        // Scored before truncation, which clears the exported declarations.
        let score = package_score(&extracted.import_path, &doc);
        let documentation = match encode_bounded(&mut doc, max_doc_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Encoding documentation of {} failed: {}", extracted.import_path, e);
                continue;
            }
        };
        docs.push(PlatformDoc {
            platform: platform.to_string(),
            rank: rank as u32,
            name: doc.name().to_string(),
            synopsis: doc.synopsis().to_string(),
            is_command: doc.is_command(),
            imports: doc.imports().to_vec(),
            score,
            documentation,
            truncated: doc.is_truncated(),
        });
    }
    docs
}
