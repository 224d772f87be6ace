//! Sync orchestrator
//!
//! The [`SyncOrchestrator`] reconciles the local note store with the shared
//! remote tree. It owns the queue, the tombstones and the watermark, and
//! reaches every store through a port trait.
//!
//! ## Sync Flow
//!
//! 1. **Push**: bootstrap the remote layout, publish the device record,
//!    propagate tombstones, then upload notebooks and standalone pages
//!    modified after the watermark
//! 2. **Pull**: list remote page files newer than the watermark, download
//!    and decode them concurrently, and import the ones that win
//!    last-writer-wins against the local copy
//! 3. **Bookkeeping**: advance the watermark only when both phases end in
//!    SUCCESS or UP_TO_DATE
//!
//! Failures never escape the public entry points: each one is logged to the
//! [`SyncLog`] and mapped to a [`SyncOutcome`]. Work that could not complete
//! in-line is parked in the [`SyncQueue`] and retried on the backoff ladder.

mod pull;
mod push;
mod replay;

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notable_core::config::SyncConfig;
use notable_core::domain::sync_file::image_file_name;
use notable_core::domain::{
    DeletionType, DeviceId, QueueStatus, SyncOperation, SyncOutcome, SyncWatermark,
};
use notable_core::ports::{
    IDeletionLogRepository, IImageStore, ILocalStore, IRemoteStore, ISyncQueueRepository,
    IWatermarkStore,
};

use crate::deletions::DeletionLog;
use crate::queue::SyncQueue;
use crate::serializer::SyncSerializer;
use crate::sync_log::SyncLog;

pub use pull::PullMode;

// ============================================================================
// Wiring
// ============================================================================

/// Adapters the orchestrator drives
///
/// `remote` is `None` until a server is configured; every remote operation
/// then reports NOT_CONFIGURED.
pub struct SyncPorts {
    pub local: Arc<dyn ILocalStore>,
    pub remote: Option<Arc<dyn IRemoteStore>>,
    pub images: Arc<dyn IImageStore>,
    pub queue: Arc<dyn ISyncQueueRepository>,
    pub deletions: Arc<dyn IDeletionLogRepository>,
    pub watermark: Arc<dyn IWatermarkStore>,
}

/// Behaviour knobs taken from the `sync` config section
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub enabled: bool,
    pub auto_sync_enabled: bool,
    pub device_name: String,
    pub upload_concurrency: usize,
    pub download_concurrency: usize,
    pub max_retries: u32,
    pub queue_batch_size: u32,
    pub deletion_retention: Duration,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            enabled: config.enabled,
            auto_sync_enabled: config.auto_sync_enabled,
            device_name: config.device_name.clone(),
            upload_concurrency: config.upload_concurrency.max(1),
            download_concurrency: config.download_concurrency.max(1),
            max_retries: config.max_retries.max(1),
            queue_batch_size: config.queue_batch_size.max(1),
            deletion_retention: Duration::days(i64::from(config.deletion_retention_days)),
        }
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

pub struct SyncOrchestrator {
    settings: SyncSettings,
    local: Arc<dyn ILocalStore>,
    remote: Option<Arc<dyn IRemoteStore>>,
    images: Arc<dyn IImageStore>,
    queue: SyncQueue,
    deletions: DeletionLog,
    watermark: Arc<dyn IWatermarkStore>,
    serializer: SyncSerializer,
    device_id: DeviceId,
    log: SyncLog,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(ports: SyncPorts, config: &SyncConfig, device_id: DeviceId) -> Self {
        Self::with_settings(ports, SyncSettings::from(config), device_id)
    }

    pub fn with_settings(ports: SyncPorts, settings: SyncSettings, device_id: DeviceId) -> Self {
        let queue = SyncQueue::new(ports.queue).with_max_retries(settings.max_retries);
        Self {
            queue,
            deletions: DeletionLog::new(ports.deletions, device_id),
            local: ports.local,
            remote: ports.remote,
            images: ports.images,
            watermark: ports.watermark,
            serializer: SyncSerializer::new(device_id),
            device_id,
            log: SyncLog::new(),
            cancel: CancellationToken::new(),
            settings,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn sync_log(&self) -> &SyncLog {
        &self.log
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn watermark(&self) -> anyhow::Result<SyncWatermark> {
        self.watermark.get().await.context("Failed to read sync watermark")
    }

    /// Token cancelled by [`SyncOrchestrator::shutdown`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.log.info("Sync shutting down");
        self.cancel.cancel();
    }

    /// The remote store, or the outcome that explains why there is none
    fn remote(&self) -> Result<&dyn IRemoteStore, SyncOutcome> {
        if !self.settings.enabled {
            return Err(SyncOutcome::Disabled);
        }
        self.remote.as_deref().ok_or(SyncOutcome::NotConfigured)
    }

    /// Map an internal failure to ERROR after logging it
    fn settle(&self, operation: &str, result: anyhow::Result<SyncOutcome>) -> SyncOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log.error(format!("{operation} failed: {e:#}"));
                SyncOutcome::Error
            }
        }
    }

    async fn is_local_empty(&self) -> anyhow::Result<bool> {
        Ok(self.local.get_all_notebooks().await?.is_empty()
            && self.local.get_all_pages().await?.is_empty())
    }

    // ------------------------------------------------------------------
    // Bidirectional cycle
    // ------------------------------------------------------------------

    /// Push then pull; the watermark moves to the cycle start only when
    /// both phases end in SUCCESS or UP_TO_DATE
    #[tracing::instrument(skip(self))]
    pub async fn sync_bidirectional(&self) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        let started = SyncWatermark::now();
        self.log.info("Starting bidirectional sync");

        let push = self.push_all(remote).await;
        let push = self.settle("Push", push);
        let pull = self.pull(remote, PullMode::Incremental).await;
        let pull = self.settle("Pull", pull);
        let combined = SyncOutcome::combine(push, pull);

        if combined.is_terminal_success() {
            if let Err(e) = self.watermark.set(started).await {
                self.log.error(format!("Could not store sync watermark: {e:#}"));
                return SyncOutcome::Error;
            }
            self.log.info(format!("Sync finished: {combined}"));
        } else {
            self.log.warn(format!(
                "Sync finished with {combined} (push {push}, pull {pull}); watermark unchanged"
            ));
        }
        combined
    }

    // ------------------------------------------------------------------
    // Destructive full resyncs
    // ------------------------------------------------------------------

    /// Delete every local entity, then import everything on the server
    ///
    /// Tombstones that never reached the server are dropped: the server
    /// copy wins.
    #[tracing::instrument(skip(self))]
    pub async fn replace_local_with_server(&self) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        let result = self.try_replace_local(remote).await;
        self.settle("Replace local with server", result)
    }

    async fn try_replace_local(&self, remote: &dyn IRemoteStore) -> anyhow::Result<SyncOutcome> {
        let started = SyncWatermark::now();
        self.log.warn("Replacing all local notes with the server copy");

        self.local.delete_all_strokes().await?;
        self.local.delete_all_images().await?;
        self.local.delete_all_pages().await?;
        self.local.delete_all_notebooks().await?;
        self.local.delete_all_folders().await?;
        let discarded = self.deletions.discard_unsynced().await?;
        if discarded > 0 {
            self.log.info(format!("Discarded {discarded} pending deletions"));
        }
        self.watermark.set(SyncWatermark::ZERO).await?;

        let outcome = self.pull(remote, PullMode::Replace).await?;
        if outcome.is_terminal_success() {
            self.watermark.set(started).await?;
        }
        Ok(outcome)
    }

    /// Delete every file under the sync root, then upload everything local
    #[tracing::instrument(skip(self))]
    pub async fn replace_server_with_local(&self) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        let result = self.try_replace_server(remote).await;
        self.settle("Replace server with local", result)
    }

    async fn try_replace_server(&self, remote: &dyn IRemoteStore) -> anyhow::Result<SyncOutcome> {
        use notable_core::domain::sync_file::{DEVICES_DIR, IMAGES_DIR, NOTEBOOKS_DIR, PAGES_DIR};

        let started = SyncWatermark::now();
        self.log.warn("Replacing all server data with the local copy");

        let mut removed = 0usize;
        for dir in [PAGES_DIR, NOTEBOOKS_DIR, DEVICES_DIR, IMAGES_DIR] {
            for file in remote
                .list_files(dir, false)
                .await
                .with_context(|| format!("Failed to list {dir}"))?
            {
                remote
                    .delete_file(&file.path)
                    .await
                    .with_context(|| format!("Failed to delete {}", file.path))?;
                removed += 1;
            }
        }
        self.log.info(format!("Removed {removed} remote files"));

        remote.initialize().await?;
        self.watermark.set(SyncWatermark::ZERO).await?;

        let outcome = self.push_all(remote).await?;
        if outcome.is_terminal_success() {
            self.watermark.set(started).await?;
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Auto-sync
    // ------------------------------------------------------------------

    /// Push one notebook after a lifecycle event such as closing it
    ///
    /// Returns immediately when sync or auto-sync is off, or when the
    /// connectivity probe fails.
    #[tracing::instrument(skip(self))]
    pub async fn auto_sync_notebook(&self, notebook_id: &str) -> SyncOutcome {
        if !self.settings.auto_sync_enabled {
            return SyncOutcome::Disabled;
        }
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        match remote.test_connection().await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                self.log
                    .debug(format!("Auto-sync of {notebook_id} skipped: server unreachable"));
                return SyncOutcome::Error;
            }
        }
        self.sync_notebook(notebook_id).await
    }

    /// Run [`SyncOrchestrator::auto_sync_notebook`] in the background
    ///
    /// The task resolves to `None` when the orchestrator shuts down first.
    pub fn spawn_auto_sync(self: &Arc<Self>, notebook_id: &str) -> JoinHandle<Option<SyncOutcome>> {
        let this = Arc::clone(self);
        let notebook_id = notebook_id.to_string();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = this.auto_sync_notebook(&notebook_id) => Some(outcome),
            }
        })
    }

    // ------------------------------------------------------------------
    // Local deletions
    // ------------------------------------------------------------------

    /// Delete a notebook locally and leave a tombstone for the next push
    pub async fn delete_notebook(&self, notebook_id: &str) -> anyhow::Result<()> {
        self.local.delete_notebook(notebook_id).await?;
        self.deletions.record(notebook_id, DeletionType::Notebook).await?;
        self.queue.resolve(notebook_id, SyncOperation::UploadNotebook).await?;
        self.log.info(format!("Deleted notebook {notebook_id}"));
        Ok(())
    }

    pub async fn delete_page(&self, page_id: &str) -> anyhow::Result<()> {
        self.local.delete_page(page_id).await?;
        self.deletions.record(page_id, DeletionType::Page).await?;
        self.queue.resolve(page_id, SyncOperation::UploadPage).await?;
        self.queue
            .resolve(page_id, SyncOperation::UploadStandalonePage)
            .await?;
        self.log.info(format!("Deleted page {page_id}"));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queue management
    // ------------------------------------------------------------------

    pub async fn queue_status(&self) -> anyhow::Result<QueueStatus> {
        self.queue.status().await
    }

    pub async fn clear_failed_queue_entries(&self) -> anyhow::Result<u64> {
        let removed = self.queue.clear_failed().await?;
        self.log.info(format!("Cleared {removed} failed queue entries"));
        Ok(removed)
    }

    pub async fn clear_all_queue_entries(&self) -> anyhow::Result<u64> {
        let removed = self.queue.clear_all().await?;
        self.log.info(format!("Cleared {removed} queue entries"));
        Ok(removed)
    }

    /// UP_TO_DATE when nothing is pending, otherwise drain the queue
    #[tracing::instrument(skip(self))]
    pub async fn retry_queued_operations(&self) -> SyncOutcome {
        if let Err(outcome) = self.remote() {
            return outcome;
        }
        match self.queue.pending_count().await {
            Ok(0) => SyncOutcome::UpToDate,
            Ok(_) => self.process_queue().await,
            Err(e) => self.settle("Queue retry", Err(e)),
        }
    }

    /// Revive dormant entries, then drain the queue
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed_operations(&self) -> SyncOutcome {
        if let Err(outcome) = self.remote() {
            return outcome;
        }
        match self.queue.retry_failed().await {
            Ok(revived) => {
                self.log.info(format!("Revived {revived} failed queue entries"));
                self.process_queue().await
            }
            Err(e) => self.settle("Queue retry", Err(e)),
        }
    }

    // ------------------------------------------------------------------
    // Probes
    // ------------------------------------------------------------------

    /// Whether anything local changed since the last completed cycle
    pub async fn has_local_changes(&self) -> anyhow::Result<bool> {
        let watermark = self.watermark().await?;
        if watermark.is_zero() {
            return Ok(!self.is_local_empty().await?);
        }
        let since = watermark.as_datetime();
        Ok(!self.local.get_pages_modified_after(since).await?.is_empty()
            || !self.local.get_notebooks_modified_after(since).await?.is_empty())
    }

    /// Whether the server holds page files newer than the watermark
    pub async fn has_remote_changes(&self) -> anyhow::Result<bool> {
        let Ok(remote) = self.remote() else {
            return Ok(false);
        };
        let watermark = self.watermark().await?;
        let files = remote.list_page_files(None).await?;
        Ok(files
            .iter()
            .any(|f| f.modified_millis().unwrap_or(0) > watermark.as_millis()))
    }

    pub async fn test_connection(&self) -> bool {
        let Some(remote) = self.remote.as_deref() else {
            return false;
        };
        match remote.test_connection().await {
            Ok(reachable) => reachable,
            Err(e) => {
                self.log.debug(format!("Connection test failed: {e:#}"));
                false
            }
        }
    }

    /// Overwrite this device's record on the server
    pub async fn update_device_info(&self) -> anyhow::Result<()> {
        let remote = self
            .remote()
            .map_err(|outcome| anyhow::anyhow!("Remote unavailable: {outcome}"))?;
        self.publish_device_info(remote).await
    }

    async fn publish_device_info(&self, remote: &dyn IRemoteStore) -> anyhow::Result<()> {
        let last_sync = self.watermark().await?.as_datetime();
        let json = self
            .serializer
            .encode_device_info(&self.settings.device_name, last_sync)?;
        remote
            .upload_device_info(&self.device_id.to_string(), &json)
            .await
    }
}

/// Remote (and local) object name for an image file
///
/// Files already carrying the `{image_id}_` prefix keep their name, so an
/// image imported from another device maps back to the same remote object.
fn image_object_name(image_id: &str, file_name: &str) -> String {
    if is_prefixed(image_id, file_name) {
        file_name.to_string()
    } else {
        image_file_name(image_id, file_name)
    }
}

/// File name as passed to `upload_image`, without the id prefix
fn image_base_name<'a>(image_id: &str, file_name: &'a str) -> &'a str {
    if is_prefixed(image_id, file_name) {
        &file_name[image_id.len() + 1..]
    } else {
        file_name
    }
}

fn is_prefixed(image_id: &str, file_name: &str) -> bool {
    file_name
        .strip_prefix(image_id)
        .is_some_and(|rest| rest.starts_with('_') && rest.len() > 1)
}
