//! Runtime configuration
//!
//! All fields have defaults so an empty (or missing) TOML file is valid. The
//! binary layers command line flags on top of whatever [`Config::load`]
//! returns.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analyzer::{MAX_DOC_SIZE, Platform};
use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_URL: &str = "https://proxy.golang.org";
pub const DEFAULT_DB_DIR: &str = ".modindex";
pub const DEFAULT_DB_FILE: &str = "index.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the module registry.
    pub registry_url: String,
    /// Base URL serving the standard library module. Falls back to `registry_url`.
    pub stdlib_registry_url: Option<String>,
    /// SQLite database file (defaults to ~/.modindex/index.db)
    pub database_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    /// Maximum archive size in bytes. `None` disables the check.
    pub max_archive_size: Option<u64>,
    /// Serialized documentation above this size is truncated.
    pub max_doc_size: usize,
    /// Ask the registry not to fetch modules it has not cached yet.
    pub fetch_disabled: bool,
    /// Target platforms in order of preference, as `os/arch`.
    pub platforms: Vec<String>,
    pub sweep_interval_secs: u64,
    /// Default bounded wait for on-demand crawls, in milliseconds.
    pub crawl_wait_ms: u64,
    /// Maximum number of import graphs computed at the same time.
    pub graph_concurrency: usize,
    /// Resolve source links for hosts that are not known code hosts by
    /// fetching `?go-get=1` pages.
    pub discover_project_sources: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            stdlib_registry_url: None,
            database_path: None,
            request_timeout_secs: 30,
            max_archive_size: Some(500 * 1024 * 1024),
            max_doc_size: MAX_DOC_SIZE,
            fetch_disabled: false,
            platforms: vec![
                "linux/amd64".to_string(),
                "windows/amd64".to_string(),
                "darwin/amd64".to_string(),
                "js/wasm".to_string(),
            ],
            sweep_interval_secs: 60,
            crawl_wait_ms: 2_000,
            graph_concurrency: 4,
            discover_project_sources: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Resolve the database file, falling back to the home directory
    pub fn database_file(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => {
                let home = dirs::home_dir()
                    .ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;
                Ok(home.join(DEFAULT_DB_DIR).join(DEFAULT_DB_FILE))
            }
        }
    }

    pub fn stdlib_registry(&self) -> &str {
        self.stdlib_registry_url.as_deref().unwrap_or(&self.registry_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn crawl_wait(&self) -> Duration {
        Duration::from_millis(self.crawl_wait_ms)
    }

    /// Parsed platform preference list. Malformed entries are skipped.
    pub fn platform_list(&self) -> Vec<Platform> {
        let platforms: Vec<Platform> = self
            .platforms
            .iter()
            .filter_map(|p| match p.parse() {
                Ok(platform) => Some(platform),
                Err(_) => {
                    tracing::warn!("Ignoring malformed platform {:?}", p);
                    None
                }
            })
            .collect();
        if platforms.is_empty() {
            vec![Platform::new("linux", "amd64")]
        } else {
            platforms
        }
    }
}
