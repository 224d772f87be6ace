//! Queue replay: retry parked operations that are due

use chrono::Utc;

use notable_core::domain::sync_file::{remote_path, PAGES_DIR};
use notable_core::domain::{file_name_of, SyncOperation, SyncOutcome, SyncQueueEntry};
use notable_core::ports::IRemoteStore;

use super::{image_base_name, PullMode, SyncOrchestrator};
use crate::SyncError;

impl SyncOrchestrator {
    /// Run one batch of queue entries whose retry time has come
    ///
    /// Each entry either succeeds and is removed, or records the failure and
    /// moves one rung up the backoff ladder. An empty batch is UP_TO_DATE.
    #[tracing::instrument(skip(self))]
    pub async fn process_queue(&self) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        let result = self.drain_queue(remote).await;
        self.settle("Queue processing", result)
    }

    async fn drain_queue(&self, remote: &dyn IRemoteStore) -> anyhow::Result<SyncOutcome> {
        let batch = self
            .queue
            .get_ready_for_retry(self.settings.queue_batch_size)
            .await?;
        if batch.is_empty() {
            return Ok(SyncOutcome::UpToDate);
        }
        self.log
            .info(format!("Retrying {} queued operations", batch.len()));

        let (mut succeeded, mut failed) = (0usize, 0usize);
        for entry in batch {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.replay(remote, &entry).await {
                Ok(()) => {
                    self.queue.mark_successful(&entry).await?;
                    succeeded += 1;
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    let updated = self.queue.mark_failed(&entry, &message).await?;
                    if updated.is_exhausted() {
                        self.log.error(format!(
                            "{} {} gave up after {} attempts: {message}",
                            entry.operation, entry.target_id, updated.retry_count
                        ));
                    } else {
                        self.log.warn(format!(
                            "{} {} failed again: {message}",
                            entry.operation, entry.target_id
                        ));
                    }
                    failed += 1;
                }
            }
        }

        let outcome = SyncOutcome::aggregate(succeeded, failed);
        self.log.info(format!(
            "Queue batch finished: {succeeded} succeeded, {failed} failed ({outcome})"
        ));
        Ok(outcome)
    }

    async fn replay(&self, remote: &dyn IRemoteStore, entry: &SyncQueueEntry) -> anyhow::Result<()> {
        let payload = entry
            .payload
            .as_deref()
            .ok_or_else(|| SyncError::MissingPayload(entry.id.clone()))?;
        let target = entry.target_id.as_str();

        match entry.operation {
            SyncOperation::UploadPage => {
                let page = self.serializer.decode_page(payload)?;
                match page.page.notebook_id.as_deref() {
                    Some(notebook_id) => {
                        remote
                            .upload_page(notebook_id, target, payload, Utc::now())
                            .await?;
                    }
                    None => {
                        remote
                            .upload_standalone_page(target, payload, Utc::now())
                            .await?;
                    }
                }
            }
            SyncOperation::UploadStandalonePage => {
                remote
                    .upload_standalone_page(target, payload, Utc::now())
                    .await?;
            }
            SyncOperation::UploadNotebook => {
                remote.upload_notebook(target, payload, Utc::now()).await?;
            }
            SyncOperation::UploadImage => {
                let bytes = self
                    .images
                    .read(payload)
                    .await?
                    .ok_or_else(|| SyncError::UnsupportedUri(payload.to_string()))?;
                let file_name = file_name_of(payload)
                    .ok_or_else(|| SyncError::InvalidFileName(payload.to_string()))?;
                remote
                    .upload_image(target, image_base_name(target, file_name), &bytes)
                    .await?;
            }
            SyncOperation::DownloadPage => {
                let bytes = remote.download_file(&remote_path(PAGES_DIR, payload)).await?;
                let page = self.decode_page_bytes(&bytes)?;
                self.apply_remote_page(remote, page, PullMode::Incremental)
                    .await?;
            }
            SyncOperation::DownloadImage => {
                let bytes = remote.download_image(payload).await?;
                self.images.write(payload, &bytes).await?;
            }
        }
        tracing::debug!(operation = %entry.operation, target, "Queued operation completed");
        Ok(())
    }
}
