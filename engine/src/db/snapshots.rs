/// Static dataset snapshot operations
use sdk::types::SnapshotRecord;
use sqlx::{Row, SqlitePool};

use super::{now_millis, StoreError};

/// Repository over the `static_snapshots` collection
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<SnapshotRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT key, payload, written_at FROM static_snapshots WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                Ok(Some(SnapshotRecord {
                    key: row.get("key"),
                    payload: serde_json::from_str(&payload)?,
                    written_at: row.get("written_at"),
                }))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the snapshot stored under `key`
    pub async fn put(
        &self,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<SnapshotRecord, StoreError> {
        let text = serde_json::to_string(payload)?;
        let written_at = now_millis();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO static_snapshots (key, payload, written_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, written_at = excluded.written_at",
        )
        .bind(key)
        .bind(&text)
        .bind(written_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(SnapshotRecord {
            key: key.to_string(),
            payload: payload.clone(),
            written_at,
        })
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM static_snapshots WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every snapshot. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM static_snapshots")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
