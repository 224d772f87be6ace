//! Push phase: local changes and tombstones to the remote

use std::collections::HashSet;

use anyhow::Context;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use notable_core::domain::sync_file::{parse_file_name, NOTEBOOKS_DIR, PAGES_DIR};
use notable_core::domain::{
    DeletionLogEntry, DeletionType, Folder, Notebook, Page, SyncFileType, SyncOperation,
    SyncOutcome, SyncWatermark,
};
use notable_core::ports::IRemoteStore;

use super::{image_base_name, SyncOrchestrator};
use crate::serializer::{resolve_folder_path, LocalImage, PageSnapshot, IMAGE_BACKGROUND_TYPE};

/// What one push pass has to upload
struct PushSet {
    notebooks: Vec<Notebook>,
    standalone_pages: Vec<Page>,
}

impl SyncOrchestrator {
    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Upload every notebook and standalone page changed since the watermark
    ///
    /// Does not move the watermark.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all(&self) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        let result = self.push_all(remote).await;
        self.settle("Push", result)
    }

    /// Upload one notebook's metadata and all of its pages
    #[tracing::instrument(skip(self))]
    pub async fn sync_notebook(&self, notebook_id: &str) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        match self.local.get_notebook_by_id(notebook_id).await {
            Ok(Some(notebook)) => self.push_notebook(remote, &notebook).await,
            Ok(None) => SyncOutcome::NotebookNotFound,
            Err(e) => self.settle("Notebook sync", Err(e)),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn sync_page(&self, page_id: &str) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        self.push_page(remote, page_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn sync_standalone_page(&self, page_id: &str) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        match self.local.get_page_by_id(page_id).await {
            Ok(Some(page)) if page.is_standalone() => self.push_standalone_page(remote, page).await,
            Ok(Some(_)) => self.push_page(remote, page_id).await,
            Ok(None) => SyncOutcome::PageNotFound,
            Err(e) => self.settle("Page sync", Err(e)),
        }
    }

    /// Propagate unsynced tombstones, then purge expired ones
    #[tracing::instrument(skip(self))]
    pub async fn sync_deletions(&self) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        let result = self.push_deletions(remote).await;
        self.settle("Deletion sync", result)
    }

    // ------------------------------------------------------------------
    // Push pass
    // ------------------------------------------------------------------

    pub(super) async fn push_all(&self, remote: &dyn IRemoteStore) -> anyhow::Result<SyncOutcome> {
        self.log.info("Pushing local changes");
        if let Err(e) = remote.initialize().await {
            self.log
                .error(format!("Could not prepare the remote layout: {e:#}"));
            return Ok(SyncOutcome::Error);
        }
        if let Err(e) = self.publish_device_info(remote).await {
            self.log.warn(format!("Could not publish device info: {e:#}"));
        }
        match self.push_deletions(remote).await {
            Ok(SyncOutcome::UpToDate) => {}
            Ok(outcome) => self.log.info(format!("Deletions: {outcome}")),
            Err(e) => self.log.warn(format!("Deletion sync failed: {e:#}")),
        }

        let watermark = self.watermark().await?;
        let set = self.collect_push_set(watermark).await?;
        let attempted = set.notebooks.len() + set.standalone_pages.len();
        if attempted == 0 {
            self.log.info("Nothing to push");
            return Ok(SyncOutcome::UpToDate);
        }

        let concurrency = self.settings.upload_concurrency;
        let mut outcomes: Vec<SyncOutcome> = stream::iter(set.notebooks)
            .map(|notebook| async move { self.push_notebook(remote, &notebook).await })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        let standalone: Vec<SyncOutcome> = stream::iter(set.standalone_pages)
            .map(|page| self.push_standalone_page(remote, page))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        outcomes.extend(standalone);

        let successes = outcomes
            .iter()
            .filter(|o| **o == SyncOutcome::Success)
            .count();
        let outcome = SyncOutcome::aggregate(successes, attempted - successes);
        self.log.info(format!(
            "Push finished: {successes}/{attempted} items uploaded ({outcome})"
        ));
        Ok(outcome)
    }

    /// Notebooks and standalone pages to upload for this watermark
    ///
    /// Zero means everything. An empty local store with a non-zero watermark
    /// pushes nothing; pull then treats the device as fresh.
    async fn collect_push_set(&self, watermark: SyncWatermark) -> anyhow::Result<PushSet> {
        if watermark.is_zero() {
            let notebooks = self.local.get_all_notebooks().await?;
            let standalone_pages = self
                .local
                .get_all_pages()
                .await?
                .into_iter()
                .filter(Page::is_standalone)
                .collect();
            return Ok(PushSet {
                notebooks,
                standalone_pages,
            });
        }

        if self.is_local_empty().await? {
            self.log
                .info("Local store is empty with a non-zero watermark; deferring to a full download");
            return Ok(PushSet {
                notebooks: Vec::new(),
                standalone_pages: Vec::new(),
            });
        }

        let since = watermark.as_datetime();
        let mut notebooks = self.local.get_notebooks_modified_after(since).await?;
        let mut seen: HashSet<String> = notebooks.iter().map(|nb| nb.id.clone()).collect();
        let mut standalone_pages = Vec::new();

        for page in self.local.get_pages_modified_after(since).await? {
            let Some(notebook_id) = page.notebook_id.clone() else {
                standalone_pages.push(page);
                continue;
            };
            if seen.contains(&notebook_id) {
                continue;
            }
            match self.local.get_notebook_by_id(&notebook_id).await? {
                Some(notebook) => {
                    seen.insert(notebook_id);
                    notebooks.push(notebook);
                }
                None => tracing::warn!(
                    page_id = %page.id,
                    notebook_id = %notebook_id,
                    "Modified page belongs to a missing notebook"
                ),
            }
        }

        Ok(PushSet {
            notebooks,
            standalone_pages,
        })
    }

    // ------------------------------------------------------------------
    // Per-entity uploads
    // ------------------------------------------------------------------

    pub(super) async fn push_notebook(
        &self,
        remote: &dyn IRemoteStore,
        notebook: &Notebook,
    ) -> SyncOutcome {
        match self.try_push_notebook(remote, notebook).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log
                    .error(format!("Notebook {} failed: {e:#}", notebook.id));
                SyncOutcome::Error
            }
        }
    }

    async fn try_push_notebook(
        &self,
        remote: &dyn IRemoteStore,
        notebook: &Notebook,
    ) -> anyhow::Result<SyncOutcome> {
        let folders =
            resolve_folder_path(self.local.as_ref(), notebook.parent_folder_id.as_deref()).await?;
        let now = Utc::now();
        let json = self.serializer.encode_notebook(notebook, &folders, now)?;

        match remote.upload_notebook(&notebook.id, &json, now).await {
            Ok(name) => {
                tracing::debug!(notebook_id = %notebook.id, %name, "Notebook metadata uploaded");
                self.queue
                    .resolve(&notebook.id, SyncOperation::UploadNotebook)
                    .await?;
            }
            Err(e) => {
                self.log.warn(format!(
                    "Notebook {} metadata upload failed, queued: {e:#}",
                    notebook.id
                ));
                self.queue.queue_notebook_upload(&notebook.id, json).await?;
                return Ok(SyncOutcome::UploadFailed);
            }
        }

        let outcomes: Vec<SyncOutcome> = stream::iter(notebook.page_ids.iter().cloned())
            .map(|page_id| async move { self.push_page(remote, &page_id).await })
            .buffer_unordered(self.settings.upload_concurrency)
            .collect()
            .await;
        if outcomes.iter().all(|o| *o == SyncOutcome::Success) {
            Ok(SyncOutcome::Success)
        } else {
            Ok(SyncOutcome::PartialSuccess)
        }
    }

    pub(super) async fn push_page(&self, remote: &dyn IRemoteStore, page_id: &str) -> SyncOutcome {
        match self.try_push_page(remote, page_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log.error(format!("Page {page_id} failed: {e:#}"));
                SyncOutcome::Error
            }
        }
    }

    async fn try_push_page(
        &self,
        remote: &dyn IRemoteStore,
        page_id: &str,
    ) -> anyhow::Result<SyncOutcome> {
        let Some(page) = self.local.get_page_by_id(page_id).await? else {
            return Ok(SyncOutcome::PageNotFound);
        };
        let Some(notebook_id) = page.notebook_id.clone() else {
            return self.try_push_standalone_page(remote, page).await;
        };
        let Some(notebook) = self.local.get_notebook_by_id(&notebook_id).await? else {
            return Ok(SyncOutcome::NotebookNotFound);
        };

        let folders =
            resolve_folder_path(self.local.as_ref(), notebook.parent_folder_id.as_deref()).await?;
        let snapshot = self.snapshot(page, Some(notebook), folders).await?;
        let failed_images = self.upload_images(remote, &snapshot.images).await;

        let now = Utc::now();
        let json = self.serializer.encode_page(&snapshot, now)?;
        let uploaded = match remote.upload_page(&notebook_id, page_id, &json, now).await {
            Ok(name) => {
                tracing::debug!(page_id, %name, "Page uploaded");
                self.queue.resolve(page_id, SyncOperation::UploadPage).await?;
                true
            }
            Err(e) => {
                self.log
                    .warn(format!("Page {page_id} upload failed, queued: {e:#}"));
                self.queue.queue_page_upload(page_id, json).await?;
                false
            }
        };

        self.finish_page(uploaded, failed_images).await
    }

    pub(super) async fn push_standalone_page(
        &self,
        remote: &dyn IRemoteStore,
        page: Page,
    ) -> SyncOutcome {
        let page_id = page.id.clone();
        match self.try_push_standalone_page(remote, page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log
                    .error(format!("Standalone page {page_id} failed: {e:#}"));
                SyncOutcome::Error
            }
        }
    }

    async fn try_push_standalone_page(
        &self,
        remote: &dyn IRemoteStore,
        page: Page,
    ) -> anyhow::Result<SyncOutcome> {
        let page_id = page.id.clone();
        let folders =
            resolve_folder_path(self.local.as_ref(), page.parent_folder_id.as_deref()).await?;
        let snapshot = self.snapshot(page, None, folders).await?;
        let failed_images = self.upload_images(remote, &snapshot.images).await;

        let now = Utc::now();
        let json = self.serializer.encode_page(&snapshot, now)?;
        let uploaded = match remote.upload_standalone_page(&page_id, &json, now).await {
            Ok(name) => {
                tracing::debug!(page_id = %page_id, %name, "Standalone page uploaded");
                self.queue
                    .resolve(&page_id, SyncOperation::UploadStandalonePage)
                    .await?;
                true
            }
            Err(e) => {
                self.log.warn(format!(
                    "Standalone page {page_id} upload failed, queued: {e:#}"
                ));
                self.queue
                    .queue_standalone_page_upload(&page_id, json)
                    .await?;
                false
            }
        };

        self.finish_page(uploaded, failed_images).await
    }

    /// Queue failed images and name the page outcome
    async fn finish_page(
        &self,
        envelope_uploaded: bool,
        failed_images: Vec<(String, String)>,
    ) -> anyhow::Result<SyncOutcome> {
        for (image_id, uri) in &failed_images {
            self.queue.queue_image_upload(image_id, uri).await?;
        }
        Ok(match (envelope_uploaded, failed_images.is_empty()) {
            (false, _) => SyncOutcome::UploadFailed,
            (true, true) => SyncOutcome::Success,
            (true, false) => SyncOutcome::PartialSuccess,
        })
    }

    /// Read a page and everything its envelope embeds
    async fn snapshot(
        &self,
        page: Page,
        notebook: Option<Notebook>,
        folder_path: Vec<Folder>,
    ) -> anyhow::Result<PageSnapshot> {
        let strokes = self.local.get_strokes_by_page_id(&page.id).await?;
        let mut images = Vec::new();
        for image in self.local.get_images_by_page_id(&page.id).await? {
            let data = match image.uri.as_deref() {
                Some(uri) => self.read_image(uri).await,
                None => None,
            };
            images.push(LocalImage { image, data });
        }
        let background = if page.background_type == IMAGE_BACKGROUND_TYPE {
            self.read_image(&page.background).await
        } else {
            None
        };

        Ok(PageSnapshot {
            notebook,
            page,
            strokes,
            images,
            background,
            folder_path,
        })
    }

    async fn read_image(&self, uri: &str) -> Option<Vec<u8>> {
        match self.images.read(uri).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(uri, error = %e, "Could not read local image");
                None
            }
        }
    }

    /// Upload image binaries missing on the remote
    ///
    /// Returns `(image_id, uri)` for every image whose upload failed. Images
    /// whose file does not resolve locally are skipped; there is nothing to
    /// retry for them.
    async fn upload_images(
        &self,
        remote: &dyn IRemoteStore,
        images: &[LocalImage],
    ) -> Vec<(String, String)> {
        let mut failed = Vec::new();
        for local in images {
            let image = &local.image;
            let (Some(uri), Some(file_name)) = (image.uri.as_deref(), image.file_name()) else {
                continue;
            };
            let Some(bytes) = local.data.as_deref() else {
                tracing::debug!(image_id = %image.id, uri, "Image file missing locally, skipped");
                continue;
            };
            let base = image_base_name(&image.id, file_name);
            if let Err(e) = remote.upload_image(&image.id, base, bytes).await {
                self.log
                    .warn(format!("Image {} upload failed, queued: {e:#}", image.id));
                failed.push((image.id.clone(), uri.to_string()));
            }
        }
        failed
    }

    // ------------------------------------------------------------------
    // Tombstones
    // ------------------------------------------------------------------

    pub(super) async fn push_deletions(
        &self,
        remote: &dyn IRemoteStore,
    ) -> anyhow::Result<SyncOutcome> {
        let pending = self.deletions.unsynced().await?;
        let outcome = if pending.is_empty() {
            SyncOutcome::UpToDate
        } else {
            let mut propagated = 0;
            let mut failed = 0;
            for entry in &pending {
                match self.propagate_deletion(remote, entry).await {
                    Ok(removed) => {
                        self.deletions.mark_synced(entry).await?;
                        tracing::debug!(
                            item_id = %entry.deleted_item_id,
                            removed,
                            "Deletion propagated"
                        );
                        propagated += 1;
                    }
                    Err(e) => {
                        self.log.warn(format!(
                            "Could not propagate deletion of {}: {e:#}",
                            entry.deleted_item_id
                        ));
                        failed += 1;
                    }
                }
            }
            self.log.info(format!(
                "Propagated {propagated} of {} deletions",
                pending.len()
            ));
            SyncOutcome::aggregate(propagated, failed)
        };

        if let Err(e) = self
            .deletions
            .purge_expired(self.settings.deletion_retention)
            .await
        {
            tracing::warn!(error = %e, "Tombstone purge failed");
        }
        Ok(outcome)
    }

    /// Remove every remote artifact of a deleted item, returning how many
    async fn propagate_deletion(
        &self,
        remote: &dyn IRemoteStore,
        entry: &DeletionLogEntry,
    ) -> anyhow::Result<usize> {
        let id = entry.deleted_item_id.as_str();
        let mut doomed = Vec::new();

        match entry.deleted_item_type {
            DeletionType::Notebook => {
                for file in remote.list_files(NOTEBOOKS_DIR, false).await? {
                    let matches = parse_file_name(&file.name).is_some_and(|info| {
                        info.kind == SyncFileType::Notebook
                            && info.notebook_id.as_deref() == Some(id)
                    });
                    if matches {
                        doomed.push(file.path);
                    }
                }
                for file in remote.list_files(PAGES_DIR, false).await? {
                    let matches = parse_file_name(&file.name).is_some_and(|info| {
                        info.kind == SyncFileType::Page && info.notebook_id.as_deref() == Some(id)
                    });
                    if matches {
                        doomed.push(file.path);
                    }
                }
            }
            DeletionType::Page => {
                for file in remote.list_files(PAGES_DIR, false).await? {
                    let matches = parse_file_name(&file.name).is_some_and(|info| {
                        info.kind == SyncFileType::Page && info.page_id.as_deref() == Some(id)
                    });
                    if matches {
                        doomed.push(file.path);
                    }
                }
            }
            // Folders have no remote artifact of their own.
            DeletionType::Folder => {}
        }

        for path in &doomed {
            remote
                .delete_file(path)
                .await
                .with_context(|| format!("Failed to delete {path}"))?;
        }
        Ok(doomed.len())
    }
}
