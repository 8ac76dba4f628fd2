//! Relational store for modules, packages, search text and the blocklist
//!
//! Everything persisted by the index goes through [`Database`]. Operations
//! are split by concern across the submodules, each adding an `impl Database`
//! block. Every multi-statement write runs in one transaction; a
//! [`sqlx::Transaction`] that is dropped without commit (error return or
//! unwinding panic) rolls back.

pub mod blocklist;
pub mod models;
pub mod modules;
pub mod packages;
pub mod project;
pub mod search;

pub use models::{
    Module, NewPackage, Package, PackageSummary, PlatformDoc, ProjectMeta, SearchHit,
};
pub use search::{is_internal_path, package_score};

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
const MAX_CONNECTIONS: u32 = 5;

/// Connection pool for the index database
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Applied to every pooled connection, not only the first.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open (creating if needed) the database file at `path` and run migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("Opening index database at {}", path.display());
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, MAX_CONNECTIONS).await
    }

    /// Connect to a private in-memory database.
    ///
    /// Limited to one connection, since each in-memory connection would
    /// otherwise see its own empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        Self::new(options, 1).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000))
    }

    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        tracing::debug!("Running database migrations");
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Let SQLite refresh planner statistics, then close the pool.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

/// Current time as stored in the database.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// SQL predicate matching `column` equal to, or nested under, a bound path.
/// The path must be bound three times.
pub(crate) fn at_or_under(column: &str) -> String {
    format!("({column} = ? OR substr({column}, 1, length(?) + 1) = ? || '/')")
}

/// SQL predicate rejecting rows whose `column` is at or under a blocklist
/// entry. Binds nothing.
pub(crate) fn not_blocked(column: &str) -> String {
    format!(
        "NOT EXISTS (SELECT 1 FROM blocklist b \
         WHERE {column} = b.prefix OR substr({column}, 1, length(b.prefix) + 1) = b.prefix || '/')"
    )
}
