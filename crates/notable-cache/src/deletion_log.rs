//! SQLite implementation of IDeletionLogRepository

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use notable_core::domain::{DeletionLogEntry, DeletionType, DeviceId};
use notable_core::ports::IDeletionLogRepository;

use crate::codec::{format_datetime, parse_datetime, parse_optional_datetime};
use crate::CacheError;

pub struct SqliteDeletionLogRepository {
    pool: SqlitePool,
}

impl SqliteDeletionLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn tombstone_from_row(row: &SqliteRow) -> Result<DeletionLogEntry, CacheError> {
    let kind: String = row.get("deleted_item_type");
    let device_id: String = row.get("device_id");

    Ok(DeletionLogEntry {
        id: row.get("id"),
        deleted_item_id: row.get("deleted_item_id"),
        deleted_item_type: kind
            .parse::<DeletionType>()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
        deleted_at: parse_datetime(row.get("deleted_at"))?,
        synced_at: parse_optional_datetime(row.get("synced_at"))?,
        device_id: device_id
            .parse::<DeviceId>()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?,
    })
}

#[async_trait::async_trait]
impl IDeletionLogRepository for SqliteDeletionLogRepository {
    async fn insert(&self, entry: &DeletionLogEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO deletion_log
                (id, deleted_item_id, deleted_item_type, deleted_at, synced_at, device_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.deleted_item_id)
        .bind(entry.deleted_item_type.as_str())
        .bind(format_datetime(&entry.deleted_at))
        .bind(entry.synced_at.as_ref().map(format_datetime))
        .bind(entry.device_id.to_string())
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            item_id = %entry.deleted_item_id,
            kind = %entry.deleted_item_type,
            "Tombstone recorded"
        );
        Ok(())
    }

    async fn get_unsynced(&self) -> anyhow::Result<Vec<DeletionLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM deletion_log WHERE synced_at IS NULL ORDER BY deleted_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(tombstone_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn mark_synced(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE deletion_log SET synced_at = ? WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_for_item(&self, item_id: &str) -> anyhow::Result<Option<DeletionLogEntry>> {
        let row = sqlx::query(
            "SELECT * FROM deletion_log WHERE deleted_item_id = ?
             ORDER BY deleted_at DESC LIMIT 1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(tombstone_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM deletion_log WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM deletion_log WHERE synced_at IS NOT NULL AND deleted_at < ?",
        )
        .bind(format_datetime(&cutoff))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
