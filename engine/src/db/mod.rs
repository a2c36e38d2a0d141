/// Persistent cache store backed by SQLite
///
/// Two collections live in one database file: completed analyses keyed by
/// question id, and static dataset snapshots keyed by logical name. The file
/// is opened in WAL mode so readers never block the single writer, and the
/// schema version is tracked in `PRAGMA user_version`.
///
/// Every repository call runs in its own transaction.
use sdk::errors::EngineError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod analyses;
pub mod schema;
pub mod snapshots;

// Re-export commonly used types
pub use analyses::AnalysisRepository;
pub use schema::{plan_migration, Collection, MigrationPlan, CURRENT_SCHEMA_VERSION};
pub use snapshots::SnapshotRepository;

/// Errors raised by the cache store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open cache store: {0}")]
    Open(String),

    #[error("Cache query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Cached payload could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema version {requested} is older than stored version {stored}")]
    VersionDowngrade { stored: u32, requested: u32 },

    #[error("Invalid schema version {0}")]
    InvalidVersion(u32),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionDowngrade { stored, requested } => {
                EngineError::SchemaDowngrade { stored, requested }
            }
            other => EngineError::Store(other.to_string()),
        }
    }
}

/// Current time in milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open (or create) the cache store at `path` with schema `version`.
pub async fn open_store(path: &Path, version: u32) -> Result<CacheStore, StoreError> {
    CacheStore::open(path, version).await
}

/// Connection pool over the cache database
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Open the store, applying the migration plan for `version`.
    ///
    /// This will:
    /// 1. Create the database file (and its directory) if it doesn't exist
    /// 2. Enable WAL mode
    /// 3. Read the stored version and existing tables, plan, and apply the
    ///    plan in a single transaction
    ///
    /// A `version` lower than the stored one fails with
    /// `StoreError::VersionDowngrade` and leaves the file untouched.
    pub async fn open(path: &Path, version: u32) -> Result<Self, StoreError> {
        info!("Opening cache store at: {}", path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Open(format!("cannot create directory: {}", e)))?;
        }

        let connection_string = format!("sqlite:{}", path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        debug!("Cache store connection established");

        let store = Self { pool };
        if let Err(e) = store.migrate(version).await {
            store.pool.close().await;
            return Err(e);
        }

        Ok(store)
    }

    async fn migrate(&self, version: u32) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let stored: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&mut *tx)
            .await?;
        let stored = u32::try_from(stored).unwrap_or(u32::MAX);

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&mut *tx)
                .await?;
        let existing: Vec<&str> = existing.iter().map(String::as_str).collect();

        let plan = plan_migration(stored, version, &existing)?;
        if plan.is_noop() {
            debug!("Cache schema at version {}, nothing to migrate", stored);
            return Ok(());
        }

        for collection in &plan.create {
            info!("Creating cache collection '{}'", collection.table_name());
            sqlx::query(collection.create_sql())
                .execute(&mut *tx)
                .await?;
        }

        if let Some(new_version) = plan.record_version {
            // PRAGMA does not accept bound parameters
            let pragma = format!("PRAGMA user_version = {}", new_version);
            sqlx::query(&pragma).execute(&mut *tx).await?;
            info!(
                "Cache schema migrated from version {} to {}",
                stored, new_version
            );
        }

        tx.commit().await?;
        Ok(())
    }

    /// Schema version recorded in the file
    pub async fn schema_version(&self) -> Result<u32, StoreError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(u32::try_from(version).unwrap_or(u32::MAX))
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Repository over the `analyses` collection
    pub fn analyses(&self) -> AnalysisRepository {
        AnalysisRepository::new(self.pool.clone())
    }

    /// Repository over the `static_snapshots` collection
    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.pool.clone())
    }

    /// Flush the WAL to disk
    pub async fn flush_wal(&self) -> Result<(), StoreError> {
        debug!("Flushing cache WAL to disk");
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Flush the WAL and close all connections
    pub async fn close(&self) -> Result<(), StoreError> {
        info!("Closing cache store");
        self.flush_wal().await?;
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_file_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("cache.db");

        let store = open_store(&db_path, CURRENT_SCHEMA_VERSION).await.unwrap();

        assert!(db_path.exists());
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(store.pool())
                .await
                .unwrap();
        assert_eq!(tables, vec!["analyses", "static_snapshots"]);
        assert_eq!(store.schema_version().await.unwrap(), 2);

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wal_mode_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir.path().join("cache.db"), 2)
            .await
            .unwrap();

        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        store.close().await.unwrap();
    }

    #[test]
    fn test_downgrade_maps_to_engine_error() {
        let err: EngineError = StoreError::VersionDowngrade {
            stored: 2,
            requested: 1,
        }
        .into();
        assert!(matches!(
            err,
            EngineError::SchemaDowngrade {
                stored: 2,
                requested: 1
            }
        ));

        let err: EngineError = StoreError::Open("disk full".into()).into();
        assert!(matches!(err, EngineError::Store(_)));
    }
}
