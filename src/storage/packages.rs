//! Package rows, documentation blobs and import edges

use std::collections::{BTreeSet, HashSet};

use super::models::{Module, NewPackage, Package, PackageRow, PackageSummary};
use super::{Database, not_blocked, now_millis};
use crate::error::Result;
use crate::registry::version;

impl Database {
    /// Write a package at one version.
    ///
    /// Package and documentation rows are insert-only: a (path, version,
    /// platform) triple that already exists is left untouched. A platform
    /// whose documentation is byte-identical to one already stored for the
    /// same version is not stored again. Import edges are merged, the
    /// importer back-references of this package are replaced, and its search
    /// entry is rewritten from the most preferred platform.
    pub async fn upsert_package(&self, package: &NewPackage) -> Result<()> {
        let Some(preferred) = package.platforms.first() else {
            tracing::debug!("No platforms to store for {}", package.import_path);
            return Ok(());
        };
        let now = now_millis();
        let mut tx = self.pool().begin().await?;

        let mut stored: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT blob FROM documentation WHERE import_path = ? AND version = ?",
        )
        .bind(&package.import_path)
        .bind(&package.version)
        .fetch_all(&mut *tx)
        .await?;

        for doc in &package.platforms {
            if stored.contains(&doc.documentation) {
                tracing::debug!(
                    "Documentation of {}@{} for {} matches a stored platform",
                    package.import_path,
                    package.version,
                    doc.platform
                );
                continue;
            }
            let inserted = sqlx::query(
                r#"
                INSERT INTO packages (import_path, version, platform, platform_rank, module_path,
                                      commit_time, name, synopsis, is_command, score, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&package.import_path)
            .bind(&package.version)
            .bind(&doc.platform)
            .bind(i64::from(doc.rank))
            .bind(&package.module_path)
            .bind(package.commit_time.timestamp_millis())
            .bind(&doc.name)
            .bind(&doc.synopsis)
            .bind(doc.is_command)
            .bind(doc.score)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted > 0 {
                sqlx::query(
                    "INSERT INTO documentation (import_path, version, platform, blob, truncated) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&package.import_path)
                .bind(&package.version)
                .bind(&doc.platform)
                .bind(&doc.documentation)
                .bind(doc.truncated)
                .execute(&mut *tx)
                .await?;
            }
            stored.push(doc.documentation.clone());
        }

        let imports: BTreeSet<&str> = package
            .platforms
            .iter()
            .flat_map(|doc| doc.imports.iter().map(String::as_str))
            .collect();
        sqlx::query("DELETE FROM importers WHERE importer_path = ?")
            .bind(&package.import_path)
            .execute(&mut *tx)
            .await?;
        for imported in imports {
            sqlx::query(
                "INSERT INTO imports (import_path, version, imported_path) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(&package.import_path)
            .bind(&package.version)
            .bind(imported)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO importers (imported_path, importer_path, importer_version) VALUES (?, ?, ?)",
            )
            .bind(imported)
            .bind(&package.import_path)
            .bind(&package.version)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM search_documents WHERE import_path = ?")
            .bind(&package.import_path)
            .execute(&mut *tx)
            .await?;
        if preferred.score > 0.0 {
            sqlx::query(
                r#"
                INSERT INTO search_documents (import_path, name, synopsis, module_path, version, score)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&package.import_path)
            .bind(&preferred.name)
            .bind(&preferred.synopsis)
            .bind(&package.module_path)
            .bind(&package.version)
            .bind(preferred.score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn has_package(&self, import_path: &str, version: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM packages WHERE import_path = ? AND version = ?)",
        )
        .bind(import_path)
        .bind(version)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Look up a package at a version. The requested platform is used when
    /// stored, otherwise the most preferred stored platform.
    pub async fn get_package(
        &self,
        import_path: &str,
        version: &str,
        platform: Option<&str>,
    ) -> Result<Option<Package>> {
        let row: Option<PackageRow> = sqlx::query_as(
            r#"
            SELECT p.import_path, p.module_path, p.version, p.platform, p.commit_time, p.name,
                   p.synopsis, p.is_command, p.score, d.blob, d.truncated
            FROM packages p
            JOIN documentation d USING (import_path, version, platform)
            WHERE p.import_path = ? AND p.version = ?
            ORDER BY (p.platform = ?) DESC, p.platform_rank ASC
            LIMIT 1
            "#,
        )
        .bind(import_path)
        .bind(version)
        .bind(platform.unwrap_or_default())
        .fetch_optional(self.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let imports = self.imports_at(import_path, version).await?;
        Ok(Some(row.into_package(imports)))
    }

    /// Look up a package at the latest version of its module that contains
    /// it. The returned module's version list is pruned to the versions in
    /// which the package is stored, and its latest version is the one served.
    pub async fn get_package_at_latest(
        &self,
        import_path: &str,
        platform: Option<&str>,
    ) -> Result<Option<(Module, Package)>> {
        let owner: Option<String> = sqlx::query_scalar(
            "SELECT module_path FROM packages WHERE import_path = ? ORDER BY length(module_path) DESC LIMIT 1",
        )
        .bind(import_path)
        .fetch_optional(self.pool())
        .await?;
        let Some(owner) = owner else {
            return Ok(None);
        };
        let Some(mut module) = self.get_module(&owner).await? else {
            return Ok(None);
        };

        let present: HashSet<String> = sqlx::query_scalar(
            "SELECT DISTINCT version FROM packages WHERE import_path = ? AND module_path = ?",
        )
        .bind(import_path)
        .bind(&owner)
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .collect();
        let mut pruned: Vec<String> = module
            .versions
            .iter()
            .filter(|v| present.contains(*v))
            .cloned()
            .collect();
        if pruned.is_empty() {
            pruned = version::sort_descending(present);
        }
        let Some(latest) = pruned.first().cloned() else {
            return Ok(None);
        };

        let Some(package) = self.get_package(import_path, &latest, platform).await? else {
            return Ok(None);
        };
        module.latest_version = latest;
        module.versions = pruned;
        Ok(Some((module, package)))
    }

    async fn imports_at(&self, import_path: &str, version: &str) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT imported_path FROM imports WHERE import_path = ? AND version = ? ORDER BY imported_path",
        )
        .bind(import_path)
        .bind(version)
        .fetch_all(self.pool())
        .await?)
    }

    /// Direct imports of a package at the crawled version of its module, or
    /// at its most recently stored version. Unknown packages import nothing.
    pub async fn imports_of(&self, import_path: &str) -> Result<Vec<String>> {
        let version: Option<String> = sqlx::query_scalar(
            r#"
            SELECT p.version
            FROM packages p
            JOIN modules m ON m.module_path = p.module_path
            WHERE p.import_path = ?
            ORDER BY (p.version = m.latest_version) DESC, p.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(import_path)
        .fetch_optional(self.pool())
        .await?;
        match version {
            Some(version) => self.imports_at(import_path, &version).await,
            None => Ok(Vec::new()),
        }
    }

    /// Packages of a module version nested under `parent` (the module path
    /// when not given). Packages behind an `internal` segment below the
    /// parent are left out unless `include_internal` is set.
    pub async fn sub_packages(
        &self,
        module_path: &str,
        version: &str,
        parent: Option<&str>,
        include_internal: bool,
    ) -> Result<Vec<PackageSummary>> {
        let sql = format!(
            r#"
            SELECT p.import_path, p.module_path, p.version, p.name, p.synopsis
            FROM packages p
            WHERE p.module_path = ? AND p.version = ? AND {}
              AND p.platform_rank = (
                  SELECT MIN(q.platform_rank) FROM packages q
                  WHERE q.import_path = p.import_path AND q.version = p.version
              )
            ORDER BY p.import_path
            "#,
            not_blocked("p.import_path")
        );
        let rows: Vec<PackageSummary> = sqlx::query_as(&sql)
            .bind(module_path)
            .bind(version)
            .fetch_all(self.pool())
            .await?;

        let parent = parent.unwrap_or(module_path);
        Ok(rows
            .into_iter()
            .filter(|row| {
                let relative = if parent == crate::registry::STDLIB_MODULE {
                    Some(row.import_path.as_str())
                } else {
                    row.import_path
                        .strip_prefix(parent)
                        .and_then(|rest| rest.strip_prefix('/'))
                };
                match relative {
                    Some(rel) => include_internal || !super::is_internal_path(rel),
                    None => false,
                }
            })
            .collect())
    }

    /// Packages whose most recent crawl imports `import_path`.
    pub async fn importers(&self, import_path: &str) -> Result<Vec<PackageSummary>> {
        let sql = format!(
            r#"
            SELECT p.import_path, p.module_path, p.version, p.name, p.synopsis
            FROM importers i
            JOIN packages p ON p.import_path = i.importer_path AND p.version = i.importer_version
            WHERE i.imported_path = ? AND {}
              AND p.platform_rank = (
                  SELECT MIN(q.platform_rank) FROM packages q
                  WHERE q.import_path = p.import_path AND q.version = p.version
              )
            ORDER BY p.import_path
            "#,
            not_blocked("p.import_path")
        );
        Ok(sqlx::query_as(&sql)
            .bind(import_path)
            .fetch_all(self.pool())
            .await?)
    }
}
