//! Deletion log persistence port

use chrono::{DateTime, Utc};

use crate::domain::DeletionLogEntry;

#[async_trait::async_trait]
pub trait IDeletionLogRepository: Send + Sync {
    async fn insert(&self, entry: &DeletionLogEntry) -> anyhow::Result<()>;

    /// Tombstones not yet propagated, oldest first
    async fn get_unsynced(&self) -> anyhow::Result<Vec<DeletionLogEntry>>;

    async fn mark_synced(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Most recent tombstone for an item, if any
    async fn get_for_item(&self, item_id: &str) -> anyhow::Result<Option<DeletionLogEntry>>;

    async fn remove(&self, id: &str) -> anyhow::Result<()>;

    /// Delete synced tombstones deleted before `cutoff`
    async fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}
