//! Durable retry queue for operations that could not complete in-line

use std::sync::Arc;

use chrono::{DateTime, Utc};

use notable_core::domain::{QueueStatus, SyncOperation, SyncQueueEntry, DEFAULT_MAX_RETRIES};
use notable_core::ports::ISyncQueueRepository;

/// Queue service owned by the orchestrator
///
/// Keeps at most one entry per `(target_id, operation)`: enqueueing replaces
/// an existing entry so the queued payload is always the latest one.
#[derive(Clone)]
pub struct SyncQueue {
    repo: Arc<dyn ISyncQueueRepository>,
    max_retries: u32,
}

impl SyncQueue {
    pub fn new(repo: Arc<dyn ISyncQueueRepository>) -> Self {
        Self {
            repo,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub async fn enqueue(
        &self,
        operation: SyncOperation,
        target_id: &str,
        payload: Option<String>,
    ) -> anyhow::Result<SyncQueueEntry> {
        self.enqueue_at(operation, target_id, payload, Utc::now()).await
    }

    pub async fn enqueue_at(
        &self,
        operation: SyncOperation,
        target_id: &str,
        payload: Option<String>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<SyncQueueEntry> {
        self.repo.delete_for_target(target_id, operation).await?;
        let entry = SyncQueueEntry::new(operation, target_id, payload, now)
            .with_max_retries(self.max_retries);
        self.repo.insert(&entry).await?;
        tracing::debug!(id = %entry.id, operation = %operation, target_id, "Operation queued");
        Ok(entry)
    }

    pub async fn mark_failed(
        &self,
        entry: &SyncQueueEntry,
        error: &str,
    ) -> anyhow::Result<SyncQueueEntry> {
        self.mark_failed_at(entry, error, Utc::now()).await
    }

    /// Apply one failed attempt and persist the new schedule
    pub async fn mark_failed_at(
        &self,
        entry: &SyncQueueEntry,
        error: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<SyncQueueEntry> {
        let mut updated = entry.clone();
        updated.record_failure(error, now);
        self.repo.update(&updated).await?;
        if updated.is_exhausted() {
            tracing::warn!(
                id = %updated.id,
                retries = updated.retry_count,
                error,
                "Queue entry exhausted its retries"
            );
        }
        Ok(updated)
    }

    pub async fn mark_successful(&self, entry: &SyncQueueEntry) -> anyhow::Result<()> {
        self.repo.delete(&entry.id).await
    }

    /// Drop any queued entry for a target whose operation just succeeded in-line
    pub async fn resolve(&self, target_id: &str, operation: SyncOperation) -> anyhow::Result<()> {
        self.repo.delete_for_target(target_id, operation).await
    }

    pub async fn get_ready_for_retry(&self, limit: u32) -> anyhow::Result<Vec<SyncQueueEntry>> {
        self.get_ready_for_retry_at(Utc::now(), limit).await
    }

    pub async fn get_ready_for_retry_at(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<SyncQueueEntry>> {
        self.repo.get_ready_for_retry(now, limit).await
    }

    pub async fn entries(&self) -> anyhow::Result<Vec<SyncQueueEntry>> {
        self.repo.get_all().await
    }

    pub async fn pending_count(&self) -> anyhow::Result<u64> {
        self.repo.pending_count().await
    }

    pub async fn failed_count(&self) -> anyhow::Result<u64> {
        self.repo.failed_count().await
    }

    pub async fn status(&self) -> anyhow::Result<QueueStatus> {
        let pending = self.repo.pending_count().await?;
        let failed = self.repo.failed_count().await?;
        Ok(QueueStatus {
            pending,
            failed,
            total: pending + failed,
        })
    }

    pub async fn clear_failed(&self) -> anyhow::Result<u64> {
        self.repo.delete_failed().await
    }

    pub async fn clear_all(&self) -> anyhow::Result<u64> {
        self.repo.delete_all().await
    }

    /// Put every dormant entry back into rotation
    pub async fn retry_failed(&self) -> anyhow::Result<u64> {
        self.repo.reset_failed(Utc::now()).await
    }

    // --- One enqueuer per operation kind ---

    /// Payload: the encoded page envelope
    pub async fn queue_page_upload(&self, page_id: &str, json: String) -> anyhow::Result<()> {
        self.enqueue(SyncOperation::UploadPage, page_id, Some(json)).await?;
        Ok(())
    }

    pub async fn queue_standalone_page_upload(
        &self,
        page_id: &str,
        json: String,
    ) -> anyhow::Result<()> {
        self.enqueue(SyncOperation::UploadStandalonePage, page_id, Some(json))
            .await?;
        Ok(())
    }

    /// Payload: the encoded notebook metadata
    pub async fn queue_notebook_upload(
        &self,
        notebook_id: &str,
        json: String,
    ) -> anyhow::Result<()> {
        self.enqueue(SyncOperation::UploadNotebook, notebook_id, Some(json))
            .await?;
        Ok(())
    }

    /// Payload: the local image URI, read again when the entry runs
    pub async fn queue_image_upload(&self, image_id: &str, uri: &str) -> anyhow::Result<()> {
        self.enqueue(SyncOperation::UploadImage, image_id, Some(uri.to_string()))
            .await?;
        Ok(())
    }

    /// Payload: the remote page file name
    pub async fn queue_page_download(
        &self,
        page_id: &str,
        remote_name: &str,
    ) -> anyhow::Result<()> {
        self.enqueue(
            SyncOperation::DownloadPage,
            page_id,
            Some(remote_name.to_string()),
        )
        .await?;
        Ok(())
    }

    /// Payload: the remote image file name
    pub async fn queue_image_download(
        &self,
        image_id: &str,
        remote_name: &str,
    ) -> anyhow::Result<()> {
        self.enqueue(
            SyncOperation::DownloadImage,
            image_id,
            Some(remote_name.to_string()),
        )
        .await?;
        Ok(())
    }
}
