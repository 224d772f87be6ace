//! WebDavRemoteStore - IRemoteStore implementation over WebDAV
//!
//! Wraps the [`WebDavClient`] with the listing cache to fulfil the
//! [`IRemoteStore`] port contract.
//!
//! ## Design Notes
//!
//! - Every upload or delete invalidates the cached listing of the directory
//!   it touched; listings are otherwise reused until the TTL expires.
//! - A listing whose directory was invalidated while the PROPFIND was in
//!   flight is returned but not cached.
//! - Listing a directory that does not exist yet yields an empty list, so a
//!   fresh server behaves like an empty one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use notable_core::config::Config;
use notable_core::domain::sync_file::{
    remote_path, DEVICES_DIR, IMAGES_DIR, NOTEBOOKS_DIR, PAGES_DIR,
};
use notable_core::ports::{IRemoteStore, WebDavFileInfo};

use crate::cache::ListingCache;
use crate::client::WebDavClient;
use crate::credentials::KeyringCredentialStorage;

/// Directories created under the sync root, root first
const LAYOUT: [&str; 5] = ["", DEVICES_DIR, NOTEBOOKS_DIR, PAGES_DIR, IMAGES_DIR];

pub struct WebDavRemoteStore {
    client: WebDavClient,
    cache: ListingCache,
}

impl WebDavRemoteStore {
    pub fn new(client: WebDavClient, listing_ttl: chrono::Duration) -> Self {
        Self {
            client,
            cache: ListingCache::new(listing_ttl),
        }
    }

    /// Build a store from configuration
    ///
    /// Returns `None` when no server is configured or no password can be found.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        if !config.server.is_configured() {
            debug!("No WebDAV server configured");
            return Ok(None);
        }
        let Some(password) = KeyringCredentialStorage::resolve(config)? else {
            warn!(
                username = %config.server.username,
                "No password available for WebDAV server"
            );
            return Ok(None);
        };
        let client = WebDavClient::new(
            config.server.url.clone(),
            config.server.username.clone(),
            password,
            &config.network,
        )
        .context("Failed to build WebDAV client")?;
        let ttl = chrono::Duration::seconds(config.sync.listing_cache_ttl_secs as i64);
        Ok(Some(Self::new(client, ttl)))
    }

    pub fn client(&self) -> &WebDavClient {
        &self.client
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }
}

/// Directory part of a relative path (`pages/x.json` -> `pages`)
fn parent_dir(path: &str) -> &str {
    path.trim_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

#[async_trait]
impl IRemoteStore for WebDavRemoteStore {
    async fn initialize(&self) -> Result<()> {
        for dir in LAYOUT {
            let path = format!("{dir}/");
            if !self
                .client
                .exists(&path)
                .await
                .with_context(|| format!("Failed to probe {}", self.client.url_for(&path)))?
            {
                self.client
                    .mkcol(&path)
                    .await
                    .with_context(|| format!("Failed to create {}", self.client.url_for(&path)))?;
                info!(dir = %self.client.url_for(&path), "Created remote directory");
            }
        }
        Ok(())
    }

    async fn upload_file(&self, path: &str, content: &[u8], content_type: &str) -> Result<()> {
        self.client
            .put(path, content, content_type)
            .await
            .with_context(|| format!("Failed to upload {path}"))?;
        self.cache.invalidate(parent_dir(path));
        Ok(())
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self
            .client
            .get(path)
            .await
            .with_context(|| format!("Failed to download {path}"))?)
    }

    async fn list_files(&self, dir: &str, use_cache: bool) -> Result<Vec<WebDavFileInfo>> {
        let dir = dir.trim_matches('/');
        if use_cache {
            if let Some(files) = self.cache.get(dir) {
                return Ok(files);
            }
        }

        let generation = self.cache.generation(dir);
        let entries = match self.client.propfind(&format!("{dir}/"), 1).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                debug!(dir, "Remote directory missing, treating as empty");
                Vec::new()
            }
            Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to list {dir}"))),
        };

        let files: Vec<WebDavFileInfo> = entries
            .into_iter()
            .filter(|entry| !entry.is_collection && !entry.href.ends_with('/'))
            .map(|entry| {
                let name = entry.name();
                WebDavFileInfo {
                    path: remote_path(dir, &name),
                    name,
                    size: entry.content_length,
                    last_modified: entry.last_modified,
                    etag: entry.etag,
                }
            })
            .collect();

        debug!(dir, count = files.len(), "Listed remote directory");
        if !self.cache.put_if_current(dir, files.clone(), generation) {
            debug!(dir, "Directory changed during listing; not caching it");
        }
        Ok(files)
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.client
            .delete(path)
            .await
            .with_context(|| format!("Failed to delete {path}"))?;
        self.cache.invalidate(parent_dir(path));
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self
            .client
            .exists(path)
            .await
            .with_context(|| format!("Failed to check {path}"))?)
    }

    async fn test_connection(&self) -> Result<bool> {
        if let Err(e) = self.client.probe_account_root().await {
            warn!(url = %self.client.base_url(), error = %e, "Connection test failed");
            return Ok(false);
        }
        // The sync root may legitimately be missing before the first sync.
        match self.client.propfind("", 0).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => {
                warn!(url = %self.client.sync_root_url(), error = %e, "Sync root unreachable");
                Ok(false)
            }
        }
    }
}
