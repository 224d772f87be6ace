//! Tombstones for local deletions
//!
//! A tombstone is written when a notebook, page or folder is deleted on this
//! device. Push propagates it to the remote and marks it synced; synced
//! tombstones are purged once they fall out of the retention window. Pull
//! consults them so a deleted page is not brought back by an older remote
//! copy.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use notable_core::domain::{DeletionLogEntry, DeletionType, DeviceId};
use notable_core::ports::IDeletionLogRepository;

#[derive(Clone)]
pub struct DeletionLog {
    repo: Arc<dyn IDeletionLogRepository>,
    device_id: DeviceId,
}

impl DeletionLog {
    pub fn new(repo: Arc<dyn IDeletionLogRepository>, device_id: DeviceId) -> Self {
        Self { repo, device_id }
    }

    pub async fn record(
        &self,
        item_id: &str,
        kind: DeletionType,
    ) -> anyhow::Result<DeletionLogEntry> {
        self.record_at(item_id, kind, Utc::now()).await
    }

    pub async fn record_at(
        &self,
        item_id: &str,
        kind: DeletionType,
        at: DateTime<Utc>,
    ) -> anyhow::Result<DeletionLogEntry> {
        let entry = DeletionLogEntry::new(item_id, kind, self.device_id, at);
        self.repo.insert(&entry).await?;
        tracing::debug!(item_id, kind = %kind, "Tombstone recorded");
        Ok(entry)
    }

    /// Oldest first
    pub async fn unsynced(&self) -> anyhow::Result<Vec<DeletionLogEntry>> {
        self.repo.get_unsynced().await
    }

    pub async fn mark_synced(&self, entry: &DeletionLogEntry) -> anyhow::Result<()> {
        self.repo.mark_synced(&entry.id, Utc::now()).await
    }

    pub async fn tombstone_for(&self, item_id: &str) -> anyhow::Result<Option<DeletionLogEntry>> {
        self.repo.get_for_item(item_id).await
    }

    pub async fn remove(&self, entry: &DeletionLogEntry) -> anyhow::Result<()> {
        self.repo.remove(&entry.id).await
    }

    /// Drop tombstones that never reached the remote, returning how many
    pub async fn discard_unsynced(&self) -> anyhow::Result<u64> {
        let pending = self.repo.get_unsynced().await?;
        for entry in &pending {
            self.repo.remove(&entry.id).await?;
        }
        Ok(pending.len() as u64)
    }

    pub async fn purge_expired(&self, retention: Duration) -> anyhow::Result<u64> {
        self.purge_expired_at(Utc::now(), retention).await
    }

    /// Remove synced tombstones deleted more than `retention` before `now`
    pub async fn purge_expired_at(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> anyhow::Result<u64> {
        let purged = self.repo.purge_synced_before(now - retention).await?;
        if purged > 0 {
            tracing::info!(purged, "Expired tombstones purged");
        }
        Ok(purged)
    }
}
