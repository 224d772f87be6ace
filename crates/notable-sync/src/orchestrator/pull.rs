//! Pull phase: remote pages and notebook metadata into the local store
//!
//! Candidate files are downloaded concurrently, then applied one at a time
//! in ascending `updatedAt`. Each one is judged against the local row as it
//! stands at that moment, so when several versions of a page are on the
//! server the newest edit is the one left behind.
//!
//! Timestamps are compared at wire precision, whole seconds. Two edits in
//! the same second tie, and the tie goes to the higher device id so every
//! device settles on the same copy.

use std::cmp::Ordering;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};

use notable_core::domain::sync_file::{parse_file_name, NOTEBOOKS_DIR, PAGES_DIR};
use notable_core::domain::{file_name_of, Image, Notebook, SyncFileType, SyncOutcome, SyncWatermark};
use notable_core::ports::{IRemoteStore, WebDavFileInfo};

use super::{image_object_name, SyncOrchestrator};
use crate::serializer::{
    to_wire_precision, LocalImage, RemoteNotebook, RemotePage, IMAGE_BACKGROUND_TYPE,
};

/// How a pull selects and judges remote files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// Files newer than the watermark; this device's own uploads are skipped
    /// and local tombstones are honoured
    Incremental,
    /// Every file, this device's own included; used after wiping local data
    Replace,
}

#[derive(Debug, Clone, Copy)]
struct PullScope {
    mode: PullMode,
    watermark: SyncWatermark,
    /// Ignore the watermark and consider every file
    full: bool,
}

#[derive(Debug, Default)]
struct Tally {
    imported: usize,
    failed: usize,
}

impl SyncOrchestrator {
    /// Import remote pages changed since the watermark
    ///
    /// Does not move the watermark.
    #[tracing::instrument(skip(self))]
    pub async fn pull_changes(&self) -> SyncOutcome {
        let remote = match self.remote() {
            Ok(remote) => remote,
            Err(outcome) => return outcome,
        };
        let result = self.pull(remote, PullMode::Incremental).await;
        self.settle("Pull", result)
    }

    /// Last-writer-wins decision for one decoded remote page
    ///
    /// Never re-imports this device's own upload. With no local copy the
    /// page is imported; otherwise a newer `updatedAt` wins, and a tie
    /// within the same second goes to the higher device id.
    pub async fn should_import_page(&self, remote: &RemotePage) -> anyhow::Result<bool> {
        if remote.device_id == self.device_id.to_string() {
            return Ok(false);
        }
        self.wins_over_local(remote).await
    }

    async fn wins_over_local(&self, remote: &RemotePage) -> anyhow::Result<bool> {
        Ok(match self.local.get_page_by_id(&remote.page.id).await? {
            None => true,
            Some(local) => self.remote_wins(
                remote.page.updated_at,
                &remote.device_id,
                local.updated_at,
            ),
        })
    }

    fn remote_wins(
        &self,
        remote_at: DateTime<Utc>,
        remote_device: &str,
        local_at: DateTime<Utc>,
    ) -> bool {
        match compare_at_wire_precision(remote_at, local_at) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => remote_device > self.device_id.to_string().as_str(),
        }
    }

    pub(super) async fn pull(
        &self,
        remote: &dyn IRemoteStore,
        mode: PullMode,
    ) -> anyhow::Result<SyncOutcome> {
        let watermark = self.watermark().await?;
        let full = match mode {
            PullMode::Replace => true,
            PullMode::Incremental => watermark.is_zero() || self.is_local_empty().await?,
        };
        if mode == PullMode::Incremental && full && !watermark.is_zero() {
            self.log
                .info("Local store is empty with a non-zero watermark; downloading everything");
        }
        let scope = PullScope {
            mode,
            watermark,
            full,
        };

        let mut tally = Tally::default();
        self.pull_pages(remote, scope, &mut tally).await?;
        self.pull_notebooks(remote, scope, &mut tally).await?;

        let outcome = SyncOutcome::aggregate(tally.imported, tally.failed);
        self.log.info(format!(
            "Pull finished: {} imported, {} failed ({outcome})",
            tally.imported, tally.failed
        ));
        Ok(outcome)
    }

    /// Remote files of `kind` that this pull should look at
    async fn list_candidates(
        &self,
        remote: &dyn IRemoteStore,
        dir: &str,
        kind: SyncFileType,
        scope: PullScope,
    ) -> anyhow::Result<Vec<WebDavFileInfo>> {
        // A replace must not act on a stale listing.
        let use_cache = scope.mode == PullMode::Incremental;
        let files = remote
            .list_files(dir, use_cache)
            .await
            .with_context(|| format!("Failed to list {dir}"))?;
        let since = scope.watermark.as_millis();
        Ok(files
            .into_iter()
            .filter(|f| parse_file_name(&f.name).is_some_and(|info| info.kind == kind))
            .filter(|f| scope.full || f.modified_millis().is_some_and(|at| at > since))
            .collect())
    }

    async fn fetch_all(
        &self,
        remote: &dyn IRemoteStore,
        files: Vec<WebDavFileInfo>,
    ) -> Vec<(WebDavFileInfo, anyhow::Result<Vec<u8>>)> {
        stream::iter(files)
            .map(|file| async move {
                let bytes = remote.download_file(&file.path).await;
                (file, bytes)
            })
            .buffer_unordered(self.settings.download_concurrency)
            .collect()
            .await
    }

    // ------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------

    async fn pull_pages(
        &self,
        remote: &dyn IRemoteStore,
        scope: PullScope,
        tally: &mut Tally,
    ) -> anyhow::Result<()> {
        let files = self
            .list_candidates(remote, PAGES_DIR, SyncFileType::Page, scope)
            .await?;
        if files.is_empty() {
            tracing::debug!("No remote page changes");
            return Ok(());
        }
        self.log
            .info(format!("Fetching {} remote page files", files.len()));

        let mut pages = Vec::new();
        for (file, downloaded) in self.fetch_all(remote, files).await {
            match downloaded {
                Ok(bytes) => match self.decode_page_bytes(&bytes) {
                    Ok(page) => pages.push(page),
                    Err(e) => {
                        self.log
                            .warn(format!("Could not decode {}: {e:#}", file.name));
                        tally.failed += 1;
                    }
                },
                Err(e) => {
                    self.log
                        .warn(format!("Download of {} failed, queued: {e:#}", file.name));
                    let page_id = parse_file_name(&file.name)
                        .and_then(|info| info.page_id)
                        .unwrap_or_else(|| file.name.clone());
                    self.queue.queue_page_download(&page_id, &file.name).await?;
                    tally.failed += 1;
                }
            }
        }

        pages.sort_by(|a, b| {
            a.page
                .updated_at
                .cmp(&b.page.updated_at)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        for page in pages {
            let page_id = page.page.id.clone();
            match self.apply_remote_page(remote, page, scope.mode).await {
                Ok(true) => tally.imported += 1,
                Ok(false) => {}
                Err(e) => {
                    self.log
                        .warn(format!("Import of page {page_id} failed: {e:#}"));
                    tally.failed += 1;
                }
            }
        }
        Ok(())
    }

    pub(super) fn decode_page_bytes(&self, bytes: &[u8]) -> anyhow::Result<RemotePage> {
        let text = std::str::from_utf8(bytes).context("Page file is not UTF-8")?;
        Ok(self.serializer.decode_page(text)?)
    }

    /// Import a page if it wins; returns whether it was written
    pub(super) async fn apply_remote_page(
        &self,
        remote: &dyn IRemoteStore,
        page: RemotePage,
        mode: PullMode,
    ) -> anyhow::Result<bool> {
        let accept = match mode {
            PullMode::Incremental => self.should_import_page(&page).await?,
            PullMode::Replace => self.wins_over_local(&page).await?,
        };
        if !accept {
            tracing::trace!(page_id = %page.page.id, "Remote page not imported");
            return Ok(false);
        }
        if mode == PullMode::Incremental && self.is_tombstoned(&page).await? {
            self.log.info(format!(
                "Page {} was deleted here after its last remote edit; not restoring it",
                page.page.id
            ));
            return Ok(false);
        }
        self.import_page(remote, page).await?;
        Ok(true)
    }

    /// A tombstone for the page or its notebook at or after the remote edit
    async fn is_tombstoned(&self, page: &RemotePage) -> anyhow::Result<bool> {
        let edited = page.page.updated_at;
        let ids = std::iter::once(page.page.id.as_str()).chain(page.page.notebook_id.as_deref());
        for id in ids {
            if let Some(tombstone) = self.deletions.tombstone_for(id).await? {
                if tombstone.deleted_at >= edited {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn import_page(&self, remote: &dyn IRemoteStore, incoming: RemotePage) -> anyhow::Result<()> {
        let RemotePage {
            notebook,
            mut page,
            page_order,
            strokes,
            images,
            background,
            ..
        } = incoming;

        // Image bytes land before any row that points at them.
        let mut stored = Vec::with_capacity(images.len());
        for LocalImage { mut image, data } in images {
            let uri = self.store_remote_image(remote, &image, data).await?;
            image.uri = uri;
            stored.push(image);
        }
        if let Some(bytes) = background {
            if page.background_type == IMAGE_BACKGROUND_TYPE {
                if let Some(name) = file_name_of(&page.background) {
                    let object = image_object_name(&page.id, name);
                    page.background = self.images.write(&object, &bytes).await?;
                }
            }
        }

        if let Some(notebook_id) = page.notebook_id.clone() {
            self.attach_to_notebook(&notebook_id, notebook, &page.id, page_order)
                .await?;
        }
        page.parent_folder_id = self.known_folder(page.parent_folder_id.take()).await?;

        self.local.upsert_page(&page).await?;
        self.local.delete_strokes_by_page_id(&page.id).await?;
        self.local.delete_images_by_page_id(&page.id).await?;
        for stroke in &strokes {
            self.local.insert_stroke(stroke).await?;
        }
        for image in &stored {
            self.local.insert_image(image).await?;
        }

        tracing::debug!(
            page_id = %page.id,
            strokes = strokes.len(),
            images = stored.len(),
            "Page imported"
        );
        Ok(())
    }

    /// Local URI for a remote image, fetching the bytes when they were not inline
    ///
    /// An image that cannot be fetched keeps the URI it will have once the
    /// queued download succeeds.
    async fn store_remote_image(
        &self,
        remote: &dyn IRemoteStore,
        image: &Image,
        data: Option<Vec<u8>>,
    ) -> anyhow::Result<Option<String>> {
        let file_name = match (image.file_name(), data.is_some()) {
            (Some(name), _) => name.to_string(),
            (None, true) => "image.png".to_string(),
            (None, false) => return Ok(None),
        };
        let object = image_object_name(&image.id, &file_name);

        if let Some(bytes) = data {
            return Ok(Some(self.images.write(&object, &bytes).await?));
        }
        match remote.download_image(&object).await {
            Ok(bytes) => Ok(Some(self.images.write(&object, &bytes).await?)),
            Err(e) => {
                self.log
                    .warn(format!("Image {} unavailable, queued: {e:#}", image.id));
                self.queue.queue_image_download(&image.id, &object).await?;
                Ok(Some(self.images.uri_for(&object)))
            }
        }
    }

    /// Make sure the page's notebook exists locally and lists the page
    async fn attach_to_notebook(
        &self,
        notebook_id: &str,
        incoming: Option<Notebook>,
        page_id: &str,
        page_order: i32,
    ) -> anyhow::Result<()> {
        match self.local.get_notebook_by_id(notebook_id).await? {
            Some(mut notebook) => {
                if !notebook.contains_page(page_id) {
                    insert_in_order(&mut notebook.page_ids, page_id, page_order);
                    self.local.update_notebook(&notebook).await?;
                }
            }
            None => {
                let mut notebook =
                    incoming.unwrap_or_else(|| Notebook::new(notebook_id, "Untitled"));
                notebook.id = notebook_id.to_string();
                notebook.parent_folder_id =
                    self.known_folder(notebook.parent_folder_id.take()).await?;
                notebook.page_ids = vec![page_id.to_string()];
                self.local.insert_notebook(&notebook).await?;
                self.log
                    .info(format!("Created notebook \"{}\" from server", notebook.title));
            }
        }
        Ok(())
    }

    /// Keep a folder reference only when the folder exists on this device
    async fn known_folder(&self, folder_id: Option<String>) -> anyhow::Result<Option<String>> {
        match folder_id {
            Some(id) if self.local.get_folder_by_id(&id).await?.is_some() => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Notebook metadata
    // ------------------------------------------------------------------

    async fn pull_notebooks(
        &self,
        remote: &dyn IRemoteStore,
        scope: PullScope,
        tally: &mut Tally,
    ) -> anyhow::Result<()> {
        let files = self
            .list_candidates(remote, NOTEBOOKS_DIR, SyncFileType::Notebook, scope)
            .await?;
        if files.is_empty() {
            return Ok(());
        }

        let mut notebooks = Vec::new();
        for (file, downloaded) in self.fetch_all(remote, files).await {
            let decoded = downloaded.and_then(|bytes| {
                let text = std::str::from_utf8(&bytes).context("Notebook file is not UTF-8")?;
                Ok(self.serializer.decode_notebook(text)?)
            });
            match decoded {
                Ok(notebook) => notebooks.push(notebook),
                Err(e) => {
                    self.log
                        .warn(format!("Could not read {}: {e:#}", file.name));
                    tally.failed += 1;
                }
            }
        }

        notebooks.sort_by(|a, b| {
            a.notebook
                .updated_at
                .cmp(&b.notebook.updated_at)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        let own = self.device_id.to_string();
        for incoming in notebooks {
            if scope.mode == PullMode::Incremental && incoming.device_id == own {
                continue;
            }
            let notebook_id = incoming.notebook.id.clone();
            match self.apply_remote_notebook(incoming, scope.mode).await {
                Ok(true) => tally.imported += 1,
                Ok(false) => {}
                Err(e) => {
                    self.log
                        .warn(format!("Notebook {notebook_id} update failed: {e:#}"));
                    tally.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Create or refresh a local notebook from its metadata file
    ///
    /// Title and template follow last-writer-wins. Page order is reconciled
    /// whenever the remote copy is at least as new, and only ever lists
    /// pages this device has.
    async fn apply_remote_notebook(
        &self,
        incoming: RemoteNotebook,
        mode: PullMode,
    ) -> anyhow::Result<bool> {
        let RemoteNotebook {
            notebook: incoming,
            device_id,
        } = incoming;
        let Some(mut local) = self.local.get_notebook_by_id(&incoming.id).await? else {
            if mode == PullMode::Incremental {
                if let Some(tombstone) = self.deletions.tombstone_for(&incoming.id).await? {
                    if tombstone.deleted_at >= incoming.updated_at {
                        return Ok(false);
                    }
                }
            }
            let mut notebook = incoming;
            notebook.page_ids = self.existing_pages(notebook.page_ids).await?;
            notebook.parent_folder_id = self.known_folder(notebook.parent_folder_id.take()).await?;
            self.local.insert_notebook(&notebook).await?;
            self.log
                .info(format!("Created notebook \"{}\" from server", notebook.title));
            return Ok(true);
        };

        if compare_at_wire_precision(incoming.updated_at, local.updated_at) == Ordering::Less {
            return Ok(false);
        }
        let mut changed = false;
        if self.remote_wins(incoming.updated_at, &device_id, local.updated_at)
            && (local.title != incoming.title
                || local.default_native_template != incoming.default_native_template
                || to_wire_precision(local.updated_at) != to_wire_precision(incoming.updated_at))
        {
            local.title = incoming.title;
            local.default_native_template = incoming.default_native_template;
            local.updated_at = incoming.updated_at;
            changed = true;
        }
        let ordered = merge_page_order(&incoming.page_ids, &local.page_ids);
        if ordered != local.page_ids {
            local.page_ids = ordered;
            changed = true;
        }
        if changed {
            self.local.update_notebook(&local).await?;
        }
        Ok(changed)
    }

    async fn existing_pages(&self, page_ids: Vec<String>) -> anyhow::Result<Vec<String>> {
        let mut present = Vec::with_capacity(page_ids.len());
        for id in page_ids {
            if self.local.get_page_by_id(&id).await?.is_some() {
                present.push(id);
            }
        }
        Ok(present)
    }
}

fn compare_at_wire_precision(a: DateTime<Utc>, b: DateTime<Utc>) -> Ordering {
    to_wire_precision(a).cmp(&to_wire_precision(b))
}

/// Insert at `order` when it is a valid position, append otherwise
fn insert_in_order(page_ids: &mut Vec<String>, page_id: &str, order: i32) {
    match usize::try_from(order) {
        Ok(index) if index <= page_ids.len() => page_ids.insert(index, page_id.to_string()),
        _ => page_ids.push(page_id.to_string()),
    }
}

/// Local pages in remote order, then local-only pages in their current order
fn merge_page_order(remote: &[String], local: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = remote
        .iter()
        .filter(|id| local.contains(id))
        .cloned()
        .collect();
    for id in local {
        if !merged.contains(id) {
            merged.push(id.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_respects_valid_order() {
        let mut pages = ids(&["a", "c"]);
        insert_in_order(&mut pages, "b", 1);
        assert_eq!(pages, ids(&["a", "b", "c"]));
        insert_in_order(&mut pages, "z", 42);
        insert_in_order(&mut pages, "y", -1);
        assert_eq!(pages, ids(&["a", "b", "c", "z", "y"]));
    }

    #[test]
    fn sub_second_digits_do_not_order_edits() {
        let base = chrono::TimeZone::timestamp_opt(&Utc, 1_700_000_000, 0).unwrap();
        let early = base + chrono::Duration::milliseconds(200);
        let late = base + chrono::Duration::milliseconds(800);
        assert_eq!(compare_at_wire_precision(early, late), Ordering::Equal);
        assert_eq!(
            compare_at_wire_precision(base + chrono::Duration::seconds(1), late),
            Ordering::Greater
        );
    }

    #[test]
    fn merge_keeps_only_local_pages() {
        let merged = merge_page_order(&ids(&["c", "x", "a"]), &ids(&["a", "b", "c"]));
        assert_eq!(merged, ids(&["c", "a", "b"]));
    }
}
