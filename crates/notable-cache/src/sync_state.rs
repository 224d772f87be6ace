//! Key/value sync state: the watermark and this device's identity

use sqlx::SqlitePool;

use notable_core::domain::{DeviceId, SyncWatermark};
use notable_core::ports::IWatermarkStore;

use crate::CacheError;

const WATERMARK_KEY: &str = "last_sync_millis";
const DEVICE_ID_KEY: &str = "device_id";

pub struct SqliteSyncStateStore {
    pool: SqlitePool,
}

impl SqliteSyncStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set_value(&self, key: &str, value: &str) -> Result<(), CacheError> {
        sqlx::query("INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The persisted device id, generated on first use
    ///
    /// Two processes racing here both end up with whichever id was written
    /// first.
    pub async fn get_or_create_device_id(&self) -> Result<DeviceId, CacheError> {
        let candidate = DeviceId::new();
        sqlx::query("INSERT OR IGNORE INTO sync_state (key, value) VALUES (?, ?)")
            .bind(DEVICE_ID_KEY)
            .bind(candidate.to_string())
            .execute(&self.pool)
            .await?;

        let stored = self.get_value(DEVICE_ID_KEY).await?.ok_or_else(|| {
            CacheError::QueryFailed("device id missing after insert".to_string())
        })?;
        let device_id = stored
            .parse::<DeviceId>()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        if device_id == candidate {
            tracing::info!(device_id = %device_id, "Generated new device id");
        }
        Ok(device_id)
    }
}

#[async_trait::async_trait]
impl IWatermarkStore for SqliteSyncStateStore {
    async fn get(&self) -> anyhow::Result<SyncWatermark> {
        match self.get_value(WATERMARK_KEY).await? {
            Some(raw) => {
                let millis = raw.parse::<i64>().map_err(|e| {
                    CacheError::SerializationError(format!("Bad watermark '{}': {}", raw, e))
                })?;
                Ok(SyncWatermark::from_millis(millis))
            }
            None => Ok(SyncWatermark::ZERO),
        }
    }

    async fn set(&self, watermark: SyncWatermark) -> anyhow::Result<()> {
        self.set_value(WATERMARK_KEY, &watermark.as_millis().to_string())
            .await?;
        tracing::debug!(watermark = %watermark, "Watermark advanced");
        Ok(())
    }
}
