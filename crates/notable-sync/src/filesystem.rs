//! Local image store (secondary/driven adapter)
//!
//! Implements [`IImageStore`] over a single directory using `tokio::fs`.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: bytes go to `{name}.tmp` in the same directory and
//!   are renamed into place, so a crash never leaves a truncated image.
//! - **URIs**: images are recorded as `file://` URIs. Plain paths are also
//!   accepted on read; other schemes (such as `content://`) do not resolve.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use url::Url;

use notable_core::ports::IImageStore;

use crate::SyncError;

#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, file_name: &str) -> Result<PathBuf, SyncError> {
        let valid = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(|c: char| c == '/' || c == '\\');
        if !valid {
            return Err(SyncError::InvalidFileName(file_name.to_string()));
        }
        Ok(self.root.join(file_name))
    }

    /// Filesystem path behind a URI, `None` for non-file schemes
    fn resolve(uri: &str) -> Option<PathBuf> {
        if uri.starts_with("file:") {
            return Url::parse(uri).ok()?.to_file_path().ok();
        }
        if uri.contains("://") {
            return None;
        }
        Some(PathBuf::from(uri))
    }
}

fn file_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(String::from)
        .unwrap_or_else(|_| format!("file://{}", path.display()))
}

#[async_trait::async_trait]
impl IImageStore for FsImageStore {
    #[instrument(skip(self))]
    async fn read(&self, uri: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(path) = Self::resolve(uri) else {
            debug!("URI does not point at a local file");
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Io(e).into()),
        }
    }

    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn write(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let target = self.path_for(file_name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|_| SyncError::ImageDirUnavailable(self.root.clone()))?;

        let tmp_path = {
            let mut p = target.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };
        tokio::fs::write(&tmp_path, bytes).await.map_err(SyncError::Io)?;
        tokio::fs::rename(&tmp_path, &target)
            .await
            .map_err(SyncError::Io)?;

        debug!(path = %target.display(), "image written");
        Ok(file_uri(&target))
    }

    fn uri_for(&self, file_name: &str) -> String {
        file_uri(&self.root.join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn write_then_read_by_uri() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path().join("images"));

        let uri = store.write("cat.png", b"\x89PNG").await.unwrap();
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("/images/cat.png"));
        assert_eq!(uri, store.uri_for("cat.png"));
        assert_eq!(store.read(&uri).await.unwrap().unwrap(), b"\x89PNG");
        assert!(!dir.path().join("images/cat.png.tmp").exists());
    }

    #[tokio::test]
    async fn write_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path());
        store.write("a.jpg", b"old").await.unwrap();
        let uri = store.write("a.jpg", b"new").await.unwrap();
        assert_eq!(store.read(&uri).await.unwrap().unwrap(), b"new");
    }

    #[tokio::test]
    async fn plain_paths_are_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.png");
        std::fs::write(&path, b"raw").unwrap();
        let store = FsImageStore::new(dir.path());
        let read = store.read(path.to_str().unwrap()).await.unwrap();
        assert_eq!(read.unwrap(), b"raw");
    }

    #[tokio::test]
    async fn unresolvable_uris_read_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path());
        assert!(store.read(&store.uri_for("missing.png")).await.unwrap().is_none());
        assert!(store
            .read("content://media/external/images/1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejects_names_with_separators() {
        let dir = TempDir::new().unwrap();
        let store = FsImageStore::new(dir.path());
        assert!(store.write("../escape.png", b"x").await.is_err());
        assert!(store.write("", b"x").await.is_err());
    }
}
