//! # Local Database Module
//!
//! Durable storage for the offline mutation queue. Queued effects and the
//! queue's key/value state live in a local SQLite database so they survive
//! process restarts.
//!
//! ## Tables
//!
//! - `offline_queue`: one row per queued effect, ordered by `seq`
//! - `sync_metadata`: key/value state (`offline:id_map`, `offline:snapshot`,
//!   `offline:cache`)
//! - `schema_migrations`: applied schema versions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xfsync::client::local_db::LocalDatabase;
//!
//! # async fn run() -> xfsync::shared::error::Result<()> {
//! let db = LocalDatabase::open("/tmp/xfsync/offline.db").await?;
//! let state = db.load_state().await?;
//! println!("{} pending effects", state.effects.len());
//! # Ok(())
//! # }
//! ```

pub mod sync;

pub use sync::{PersistedState, CACHE_KEY, ID_MAP_KEY, SNAPSHOT_KEY};

use crate::shared::error::{Result, SyncError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database at `path`
    ///
    /// Creates parent directories and the file if needed, enables WAL mode, and
    /// initializes the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        // One connection: the queue has a single writer
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        tracing::debug!("[LocalDb] Opened {}", path.display());
        Self::with_pool(pool).await
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // The database lives as long as its only connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Initialize database schema
    ///
    /// Creates all necessary tables and runs any pending migrations.
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("schema.sql")).execute(&self.pool).await?;
        self.run_migrations().await
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await?;

        if current_version.0 < 1 {
            self.apply_migration_1().await?;
        }

        Ok(())
    }

    /// Migration 1: initial schema
    async fn apply_migration_1(&self) -> Result<()> {
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?)")
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current schema version
    pub async fn schema_version(&self) -> Result<i64> {
        let version: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await?;
        Ok(version.0)
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let pending: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?;
        let metadata: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_metadata")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            pending_effects: pending.0 as u64,
            metadata_entries: metadata.0 as u64,
        })
    }

    /// Close the pool, waiting for in-progress work
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Rows in `offline_queue`
    pub pending_effects: u64,
    /// Rows in `sync_metadata`
    pub metadata_entries: u64,
}
