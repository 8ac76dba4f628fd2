//! Stored entities and their row mappings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::from_millis;
use crate::error::{Error, Result};

/// A module and its known versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub module_path: String,
    pub series_path: String,
    pub latest_version: String,
    /// Descending by version precedence; `versions[0] == latest_version`.
    pub versions: Vec<String>,
    pub deprecated: Option<String>,
    pub commit_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A package on one platform at one version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
    pub import_path: String,
    pub module_path: String,
    pub version: String,
    pub platform: String,
    pub commit_time: DateTime<Utc>,
    pub name: String,
    pub synopsis: String,
    pub is_command: bool,
    pub imports: Vec<String>,
    pub score: f64,
    pub truncated: bool,
    /// Serialized documentation, opaque to storage.
    #[serde(skip)]
    pub documentation: Vec<u8>,
}

/// Listing entry used by sub-package and importer queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PackageSummary {
    pub import_path: String,
    pub module_path: String,
    pub version: String,
    pub name: String,
    pub synopsis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SearchHit {
    pub import_path: String,
    pub module_path: String,
    pub version: String,
    pub name: String,
    pub synopsis: String,
    pub score: f64,
}

/// Source link templates for a module's repository. Templates use
/// `{commit}`, `{dir}`, `{file}` and `{line}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub module_path: String,
    pub name: String,
    pub url: String,
    pub dir_template: String,
    pub file_template: String,
    pub line_template: String,
    pub updated_at: DateTime<Utc>,
}

/// Analysis output of one package for one platform, ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformDoc {
    pub platform: String,
    /// Position of the platform in the configured preference list.
    pub rank: u32,
    pub name: String,
    pub synopsis: String,
    pub is_command: bool,
    pub imports: Vec<String>,
    pub score: f64,
    pub documentation: Vec<u8>,
    pub truncated: bool,
}

/// A package to write, with one entry per analyzed platform in preference order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPackage {
    pub import_path: String,
    pub module_path: String,
    pub version: String,
    pub commit_time: DateTime<Utc>,
    pub platforms: Vec<PlatformDoc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ModuleRow {
    pub(crate) module_path: String,
    pub(crate) series_path: String,
    pub(crate) latest_version: String,
    pub(crate) versions: String,
    pub(crate) deprecated: Option<String>,
    pub(crate) commit_time: i64,
    pub(crate) updated_at: i64,
}

impl TryFrom<&Module> for ModuleRow {
    type Error = Error;
    fn try_from(module: &Module) -> Result<Self> {
        Ok(Self {
            module_path: module.module_path.clone(),
            series_path: module.series_path.clone(),
            latest_version: module.latest_version.clone(),
            versions: serde_json::to_string(&module.versions)?,
            deprecated: module.deprecated.clone(),
            commit_time: module.commit_time.timestamp_millis(),
            updated_at: module.updated_at.timestamp_millis(),
        })
    }
}

impl TryFrom<ModuleRow> for Module {
    type Error = Error;
    fn try_from(row: ModuleRow) -> Result<Self> {
        Ok(Self {
            module_path: row.module_path,
            series_path: row.series_path,
            latest_version: row.latest_version,
            versions: serde_json::from_str(&row.versions)?,
            deprecated: row.deprecated,
            commit_time: from_millis(row.commit_time),
            updated_at: from_millis(row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PackageRow {
    pub(crate) import_path: String,
    pub(crate) module_path: String,
    pub(crate) version: String,
    pub(crate) platform: String,
    pub(crate) commit_time: i64,
    pub(crate) name: String,
    pub(crate) synopsis: String,
    pub(crate) is_command: bool,
    pub(crate) score: f64,
    pub(crate) blob: Vec<u8>,
    pub(crate) truncated: bool,
}

impl PackageRow {
    pub(crate) fn into_package(self, imports: Vec<String>) -> Package {
        Package {
            import_path: self.import_path,
            module_path: self.module_path,
            version: self.version,
            platform: self.platform,
            commit_time: from_millis(self.commit_time),
            name: self.name,
            synopsis: self.synopsis,
            is_command: self.is_command,
            imports,
            score: self.score,
            truncated: self.truncated,
            documentation: self.blob,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProjectRow {
    pub(crate) module_path: String,
    pub(crate) name: String,
    pub(crate) url: String,
    pub(crate) dir_template: String,
    pub(crate) file_template: String,
    pub(crate) line_template: String,
    pub(crate) updated_at: i64,
}

impl From<ProjectRow> for ProjectMeta {
    fn from(row: ProjectRow) -> Self {
        Self {
            module_path: row.module_path,
            name: row.name,
            url: row.url,
            dir_template: row.dir_template,
            file_template: row.file_template,
            line_template: row.line_template,
            updated_at: from_millis(row.updated_at),
        }
    }
}
