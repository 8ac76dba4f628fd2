//! Hierarchical blocklist
//!
//! An entry blocks the path itself and everything nested under it, so
//! `a/b` blocks `a/b/c` but neither `a` nor `a/bc`.

use super::{Database, at_or_under, now_millis};
use crate::error::Result;
use crate::registry::path_and_ancestors;

/// Tables cleared when a prefix is blocked, with the column holding the path.
const BLOCKED_ROWS: &[(&str, &str)] = &[
    ("search_documents", "import_path"),
    ("importers", "importer_path"),
    ("imports", "import_path"),
    ("documentation", "import_path"),
    ("packages", "import_path"),
    ("projects", "module_path"),
    ("modules", "module_path"),
];

impl Database {
    /// Whether `path` or any of its ancestors is blocked.
    pub async fn is_blocked(&self, path: &str) -> Result<bool> {
        let candidates: Vec<&str> = path_and_ancestors(path).collect();
        let (blocked,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM blocklist WHERE prefix IN (SELECT value FROM json_each(?)))",
        )
        .bind(serde_json::to_string(&candidates)?)
        .fetch_one(self.pool())
        .await?;
        Ok(blocked)
    }

    /// Block `prefix` and delete every stored row at or under it.
    pub async fn block(&self, prefix: &str) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("INSERT INTO blocklist (prefix, created_at) VALUES (?, ?) ON CONFLICT DO NOTHING")
            .bind(prefix)
            .bind(now_millis())
            .execute(&mut *tx)
            .await?;
        let mut removed = 0;
        for (table, column) in BLOCKED_ROWS {
            let sql = format!("DELETE FROM {table} WHERE {}", at_or_under(column));
            removed += sqlx::query(&sql)
                .bind(prefix)
                .bind(prefix)
                .bind(prefix)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        tracing::info!("Blocked {} ({} rows removed)", prefix, removed);
        Ok(())
    }

    /// Remove a blocklist entry. Returns whether it existed.
    pub async fn unblock(&self, prefix: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blocklist WHERE prefix = ?")
            .bind(prefix)
            .execute(self.pool())
            .await?;
        let existed = result.rows_affected() > 0;
        if existed {
            tracing::info!("Unblocked {}", prefix);
        }
        Ok(existed)
    }
}
