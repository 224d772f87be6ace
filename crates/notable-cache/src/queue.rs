//! SQLite implementation of ISyncQueueRepository

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use notable_core::domain::{SyncOperation, SyncQueueEntry, SyncTargetType};
use notable_core::ports::ISyncQueueRepository;

use crate::codec::{format_datetime, parse_datetime, parse_optional_datetime};
use crate::CacheError;

pub struct SqliteSyncQueueRepository {
    pool: SqlitePool,
}

impl SqliteSyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn write(&self, entry: &SyncQueueEntry) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_queue
                (id, operation, target_id, target_type, retry_count, max_retries, payload,
                 error_message, created_at, last_attempt_at, next_retry_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.operation.as_str())
        .bind(&entry.target_id)
        .bind(entry.target_type.as_str())
        .bind(i64::from(entry.retry_count))
        .bind(i64::from(entry.max_retries))
        .bind(&entry.payload)
        .bind(&entry.error_message)
        .bind(format_datetime(&entry.created_at))
        .bind(entry.last_attempt_at.as_ref().map(format_datetime))
        .bind(entry.next_retry_at.as_ref().map(format_datetime))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self, sql: &str) -> anyhow::Result<u64> {
        let n: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<SyncQueueEntry, CacheError> {
    let operation: String = row.get("operation");
    let target_type: String = row.get("target_type");
    let retry_count: i64 = row.get("retry_count");
    let max_retries: i64 = row.get("max_retries");

    Ok(SyncQueueEntry {
        id: row.get("id"),
        operation: operation
            .parse::<SyncOperation>()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        target_id: row.get("target_id"),
        target_type: target_type
            .parse::<SyncTargetType>()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        retry_count: u32::try_from(retry_count).unwrap_or(0),
        max_retries: u32::try_from(max_retries).unwrap_or(0),
        payload: row.get("payload"),
        error_message: row.get("error_message"),
        created_at: parse_datetime(row.get("created_at"))?,
        last_attempt_at: parse_optional_datetime(row.get("last_attempt_at"))?,
        next_retry_at: parse_optional_datetime(row.get("next_retry_at"))?,
    })
}

#[async_trait::async_trait]
impl ISyncQueueRepository for SqliteSyncQueueRepository {
    async fn insert(&self, entry: &SyncQueueEntry) -> anyhow::Result<()> {
        self.write(entry).await?;
        tracing::trace!(id = %entry.id, operation = %entry.operation, "Queue entry inserted");
        Ok(())
    }

    async fn update(&self, entry: &SyncQueueEntry) -> anyhow::Result<()> {
        self.write(entry).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_for_target(
        &self,
        target_id: &str,
        operation: SyncOperation,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE target_id = ? AND operation = ?")
            .bind(target_id)
            .bind(operation.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_ready_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<SyncQueueEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_queue
             WHERE next_retry_at IS NOT NULL AND next_retry_at <= ? AND retry_count < max_retries
             ORDER BY next_retry_at ASC
             LIMIT ?",
        )
        .bind(format_datetime(&now))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_all(&self) -> anyhow::Result<Vec<SyncQueueEntry>> {
        let rows = sqlx::query("SELECT * FROM sync_queue ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn pending_count(&self) -> anyhow::Result<u64> {
        self.count("SELECT COUNT(*) FROM sync_queue WHERE retry_count < max_retries")
            .await
    }

    async fn failed_count(&self) -> anyhow::Result<u64> {
        self.count("SELECT COUNT(*) FROM sync_queue WHERE retry_count >= max_retries")
            .await
    }

    async fn delete_failed(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE retry_count >= max_retries")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sync_queue")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn reset_failed(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE sync_queue
             SET retry_count = 0, error_message = NULL, next_retry_at = ?
             WHERE retry_count >= max_retries",
        )
        .bind(format_datetime(&now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
