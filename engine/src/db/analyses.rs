/// Analysis cache operations
///
/// Payloads are stored as JSON text: a string for a simple analysis, an
/// object with `coach`/`deep`/`quick` for a multi-perspective one.
use sdk::types::{AnalysisRecord, AnalysisResult, QuestionId};
use sqlx::{Row, SqlitePool};

use super::{now_millis, StoreError};

/// Repository over the `analyses` collection
pub struct AnalysisRepository {
    pool: SqlitePool,
}

impl AnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch the record for `id`, if any
    pub async fn get(&self, id: QuestionId) -> Result<Option<AnalysisRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT id, payload, written_at FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row.get("payload");
        Ok(Some(AnalysisRecord {
            key: row.get("id"),
            payload: serde_json::from_str(&payload)?,
            written_at: row.get("written_at"),
        }))
    }

    /// Insert or replace the record for `id`, stamped with the current time.
    ///
    /// Concurrent writes to one id resolve last-writer-wins.
    pub async fn put(
        &self,
        id: QuestionId,
        result: &AnalysisResult,
    ) -> Result<AnalysisRecord, StoreError> {
        let payload = serde_json::to_string(result)?;
        let written_at = now_millis();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO analyses (id, payload, written_at) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, written_at = excluded.written_at",
        )
        .bind(id)
        .bind(&payload)
        .bind(written_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(AnalysisRecord {
            key: id,
            payload: result.clone(),
            written_at,
        })
    }

    /// Remove the record for `id`. Returns whether a record existed.
    pub async fn delete(&self, id: QuestionId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every record. Returns how many were removed.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM analyses")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Ids of every cached analysis, ascending
    pub async fn list_ids(&self) -> Result<Vec<QuestionId>, StoreError> {
        let ids: Vec<QuestionId> = sqlx::query_scalar("SELECT id FROM analyses ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
