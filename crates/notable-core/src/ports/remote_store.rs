//! Remote file store port (driven/secondary port)
//!
//! This module defines the interface to the shared remote file tree. The
//! primary implementation targets WebDAV servers, but the orchestrator only
//! depends on this trait so tests can run against an in-memory fake.
//!
//! ## Design Notes
//!
//! - Paths are relative to the sync root (`pages/nb_p_1.json`); the adapter
//!   resolves them against the server URL.
//! - `upload_file` compresses and `download_file` transparently inflates.
//!   Callers always see plain bytes.
//! - The provided methods encode the naming convention once, so every
//!   adapter writes the same layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::sync_file::{
    self, parse_file_name, remote_path, DEVICES_DIR, IMAGES_DIR, NOTEBOOKS_DIR, PAGES_DIR,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// WebDavFileInfo
// ============================================================================

/// A remote object described without fetching its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDavFileInfo {
    /// Decoded last path segment
    pub name: String,
    /// Path relative to the sync root
    pub path: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl WebDavFileInfo {
    /// Modification time in epoch millis
    ///
    /// Falls back to the timestamp embedded in the file name when the server
    /// reported no `getlastmodified`.
    pub fn modified_millis(&self) -> Option<i64> {
        self.last_modified
            .map(|at| at.timestamp_millis())
            .or_else(|| parse_file_name(&self.name).and_then(|info| info.timestamp))
    }
}

// ============================================================================
// IRemoteStore trait
// ============================================================================

#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Create the sync root and its sub-directories when missing
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Write `content` at `path`, invalidating the cached listing of its directory
    async fn upload_file(&self, path: &str, content: &[u8], content_type: &str)
        -> anyhow::Result<()>;

    async fn download_file(&self, path: &str) -> anyhow::Result<Vec<u8>>;

    /// Files directly inside `dir`; `use_cache` allows a listing younger than the TTL
    async fn list_files(&self, dir: &str, use_cache: bool) -> anyhow::Result<Vec<WebDavFileInfo>>;

    /// Remove `path`; a missing file is not an error
    async fn delete_file(&self, path: &str) -> anyhow::Result<()>;

    async fn file_exists(&self, path: &str) -> anyhow::Result<bool>;

    /// Whether both the account root and the sync root answer
    async fn test_connection(&self) -> anyhow::Result<bool>;

    // --- Provided operations ---

    /// Upload a page envelope, returning the remote file name
    async fn upload_page(
        &self,
        notebook_id: &str,
        page_id: &str,
        json: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let name = sync_file::page_file_name(notebook_id, page_id, at);
        self.upload_file(&remote_path(PAGES_DIR, &name), json.as_bytes(), JSON_CONTENT_TYPE)
            .await?;
        Ok(name)
    }

    async fn upload_standalone_page(
        &self,
        page_id: &str,
        json: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let name = sync_file::standalone_page_file_name(page_id, at);
        self.upload_file(&remote_path(PAGES_DIR, &name), json.as_bytes(), JSON_CONTENT_TYPE)
            .await?;
        Ok(name)
    }

    async fn upload_notebook(
        &self,
        notebook_id: &str,
        json: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let name = sync_file::notebook_file_name(notebook_id, at);
        self.upload_file(
            &remote_path(NOTEBOOKS_DIR, &name),
            json.as_bytes(),
            JSON_CONTENT_TYPE,
        )
        .await?;
        Ok(name)
    }

    /// Overwrite the single canonical device record
    async fn upload_device_info(&self, device_id: &str, json: &str) -> anyhow::Result<()> {
        let name = sync_file::device_file_name(device_id);
        self.upload_file(&remote_path(DEVICES_DIR, &name), json.as_bytes(), JSON_CONTENT_TYPE)
            .await
    }

    /// Upload image bytes unless the object already exists; returns the remote name
    async fn upload_image(
        &self,
        image_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<String> {
        let name = sync_file::image_file_name(image_id, file_name);
        let path = remote_path(IMAGES_DIR, &name);
        if !self.file_exists(&path).await? {
            self.upload_file(&path, bytes, BINARY_CONTENT_TYPE).await?;
        }
        Ok(name)
    }

    async fn download_image(&self, remote_name: &str) -> anyhow::Result<Vec<u8>> {
        self.download_file(&remote_path(IMAGES_DIR, remote_name)).await
    }

    /// JSON page files, optionally only those of one notebook
    async fn list_page_files(
        &self,
        notebook_id: Option<&str>,
    ) -> anyhow::Result<Vec<WebDavFileInfo>> {
        let files = self.list_files(PAGES_DIR, true).await?;
        Ok(filter_by_notebook(files, notebook_id))
    }

    async fn list_notebook_files(
        &self,
        notebook_id: Option<&str>,
    ) -> anyhow::Result<Vec<WebDavFileInfo>> {
        let files = self.list_files(NOTEBOOKS_DIR, true).await?;
        Ok(filter_by_notebook(files, notebook_id))
    }
}

fn filter_by_notebook(files: Vec<WebDavFileInfo>, notebook_id: Option<&str>) -> Vec<WebDavFileInfo> {
    files
        .into_iter()
        .filter(|file| file.name.ends_with(".json"))
        .filter(|file| match notebook_id {
            Some(id) => file
                .name
                .strip_prefix(id)
                .is_some_and(|rest| rest.starts_with('_')),
            None => true,
        })
        .collect()
}
