//! SQLite connection pooling
//!
//! One [`DatabasePool`] per deployment. Opening it is the only moment
//! schema DDL runs; every store built on top assumes the tables and
//! indexes already exist.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::StoreError;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const SCHEMA: &str = include_str!("migrations/20260210_sync_schema.sql");

/// Shared handle on the SQLite database holding all sync state
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the database file, creating it and its directory as needed,
    /// and applies the schema.
    ///
    /// WAL journaling keeps pulls readable while a push is writing; the
    /// busy timeout absorbs short write contention instead of surfacing
    /// it to callers.
    ///
    /// # Errors
    /// `StoreError::ConnectionFailed` when the file or its directory
    /// cannot be opened, `StoreError::MigrationFailed` when the schema
    /// DDL fails.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                StoreError::ConnectionFailed(format!("cannot create {}: {e}", dir.display()))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(BUSY_TIMEOUT),
            )
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display()))
            })?;

        Self::apply_schema(&pool).await?;
        tracing::info!(path = %db_path.display(), "sync database opened");
        Ok(Self { pool })
    }

    /// In-memory database for tests.
    ///
    /// Capped at one connection: an in-memory SQLite database is private
    /// to its connection, and a second one would see an empty schema.
    ///
    /// # Errors
    /// `StoreError::ConnectionFailed` or `StoreError::MigrationFailed`,
    /// as for [`DatabasePool::open`].
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("cannot open in-memory db: {e}")))?;

        Self::apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying connection pool, for the stores to clone
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent DDL: everything in the schema is CREATE ... IF NOT EXISTS
    async fn apply_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("schema setup failed: {e}")))?;
        Ok(())
    }
}
