//! Project metadata rows

use super::Database;
use super::models::{ProjectMeta, ProjectRow};
use crate::error::Result;

impl Database {
    pub async fn get_project(&self, module_path: &str) -> Result<Option<ProjectMeta>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT module_path, name, url, dir_template, file_template, line_template, updated_at
            FROM projects WHERE module_path = ?
            "#,
        )
        .bind(module_path)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(ProjectMeta::from))
    }

    pub async fn put_project(&self, meta: &ProjectMeta) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (module_path, name, url, dir_template, file_template, line_template, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (module_path) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                dir_template = excluded.dir_template,
                file_template = excluded.file_template,
                line_template = excluded.line_template,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&meta.module_path)
        .bind(&meta.name)
        .bind(&meta.url)
        .bind(&meta.dir_template)
        .bind(&meta.file_template)
        .bind(&meta.line_template)
        .bind(meta.updated_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::from_millis;

    #[tokio::test]
    async fn test_put_and_get_project() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(db.get_project("github.com/a/b").await.unwrap().is_none());

        let mut meta = ProjectMeta {
            module_path: "github.com/a/b".to_string(),
            name: "b".to_string(),
            url: "https://github.com/a/b".to_string(),
            dir_template: "https://github.com/a/b/tree/{commit}/{dir}".to_string(),
            file_template: "https://github.com/a/b/blob/{commit}/{file}".to_string(),
            line_template: "https://github.com/a/b/blob/{commit}/{file}#L{line}".to_string(),
            updated_at: from_millis(1_000),
        };
        db.put_project(&meta).await.unwrap();
        meta.updated_at = from_millis(2_000);
        db.put_project(&meta).await.unwrap();

        assert_eq!(db.get_project("github.com/a/b").await.unwrap(), Some(meta));
    }
}
