//! Sync queue persistence port

use chrono::{DateTime, Utc};

use crate::domain::{SyncOperation, SyncQueueEntry};

/// Durable storage for [`SyncQueueEntry`] records
///
/// "Pending" means `retry_count < max_retries`; "failed" means the entry
/// exhausted its retries and is dormant.
#[async_trait::async_trait]
pub trait ISyncQueueRepository: Send + Sync {
    async fn insert(&self, entry: &SyncQueueEntry) -> anyhow::Result<()>;

    async fn update(&self, entry: &SyncQueueEntry) -> anyhow::Result<()>;

    async fn delete(&self, id: &str) -> anyhow::Result<()>;

    /// Remove every entry for the `(target_id, operation)` pair
    async fn delete_for_target(
        &self,
        target_id: &str,
        operation: SyncOperation,
    ) -> anyhow::Result<()>;

    /// Entries with `next_retry_at <= now` that are still pending,
    /// oldest `next_retry_at` first
    async fn get_ready_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<SyncQueueEntry>>;

    /// All entries ordered by creation time
    async fn get_all(&self) -> anyhow::Result<Vec<SyncQueueEntry>>;

    async fn pending_count(&self) -> anyhow::Result<u64>;

    async fn failed_count(&self) -> anyhow::Result<u64>;

    /// Remove dormant entries, returning how many were removed
    async fn delete_failed(&self) -> anyhow::Result<u64>;

    async fn delete_all(&self) -> anyhow::Result<u64>;

    /// Reset dormant entries to retry count zero, ready at `now`
    async fn reset_failed(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
}
