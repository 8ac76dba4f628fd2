//! Module rows

use chrono::{DateTime, Utc};

use super::models::{Module, ModuleRow};
use super::{Database, now_millis};
use crate::error::Result;

const MODULE_COLUMNS: &str =
    "module_path, series_path, latest_version, versions, deprecated, commit_time, updated_at";

impl Database {
    /// Insert or refresh a module row.
    ///
    /// Search entries of the module that belong to a different version are
    /// dropped in the same transaction, so search only ever reflects the
    /// version being crawled.
    pub async fn upsert_module(&self, module: &Module) -> Result<()> {
        let row = ModuleRow::try_from(module)?;
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO modules (module_path, series_path, latest_version, versions, deprecated, commit_time, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (module_path) DO UPDATE SET
                series_path = excluded.series_path,
                latest_version = excluded.latest_version,
                versions = excluded.versions,
                deprecated = excluded.deprecated,
                commit_time = excluded.commit_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.module_path)
        .bind(&row.series_path)
        .bind(&row.latest_version)
        .bind(&row.versions)
        .bind(&row.deprecated)
        .bind(row.commit_time)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM search_documents WHERE module_path = ? AND version != ?")
            .bind(&row.module_path)
            .bind(&row.latest_version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::debug!("Stored module {}@{}", module.module_path, module.latest_version);
        Ok(())
    }

    pub async fn get_module(&self, module_path: &str) -> Result<Option<Module>> {
        let row: Option<ModuleRow> =
            sqlx::query_as(&format!("SELECT {MODULE_COLUMNS} FROM modules WHERE module_path = ?"))
                .bind(module_path)
                .fetch_optional(self.pool())
                .await?;
        row.map(Module::try_from).transpose()
    }

    pub async fn has_module(&self, module_path: &str) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM modules WHERE module_path = ?)")
                .bind(module_path)
                .fetch_one(self.pool())
                .await?;
        Ok(exists)
    }

    /// Refresh the update timestamp only. Returns the new timestamp, or
    /// `None` if the module has no row.
    pub async fn touch_module(&self, module_path: &str) -> Result<Option<DateTime<Utc>>> {
        let now = now_millis();
        let result = sqlx::query("UPDATE modules SET updated_at = ? WHERE module_path = ?")
            .bind(now)
            .bind(module_path)
            .execute(self.pool())
            .await?;
        Ok((result.rows_affected() > 0).then(|| super::from_millis(now)))
    }

    /// The module with the oldest update timestamp, if any.
    pub async fn oldest_module(&self) -> Result<Option<Module>> {
        let row: Option<ModuleRow> = sqlx::query_as(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules ORDER BY updated_at ASC, module_path ASC LIMIT 1"
        ))
        .fetch_optional(self.pool())
        .await?;
        row.map(Module::try_from).transpose()
    }
}
