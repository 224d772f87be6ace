//! Shared fixtures: an in-memory remote and fully wired test devices
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use notable_cache::{
    DatabasePool, SqliteDeletionLogRepository, SqliteLocalStore, SqliteSyncQueueRepository,
    SqliteSyncStateStore,
};
use notable_core::domain::{DeviceId, Notebook, Page, Pen, Stroke, StrokePoint};
use notable_core::ports::{ILocalStore, IRemoteStore, WebDavFileInfo};
use notable_sync::orchestrator::SyncSettings;
use notable_sync::{FsImageStore, SyncOrchestrator, SyncPorts};

// ============================================================================
// MemoryRemote
// ============================================================================

struct StoredFile {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Remote file tree kept in a map keyed by path relative to the sync root
#[derive(Default)]
pub struct MemoryRemote {
    files: Mutex<BTreeMap<String, StoredFile>>,
    fail_uploads: AtomicBool,
    fail_downloads: AtomicBool,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_downloads(&self, fail: bool) {
        self.fail_downloads.store(fail, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// File names directly under `dir`
    pub fn names(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{dir}/");
        self.files
            .lock()
            .unwrap()
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).map(|f| f.bytes.clone())
    }

    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert(
            path.to_string(),
            StoredFile {
                bytes: bytes.to_vec(),
                modified: Utc::now(),
            },
        );
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn ensure_online(&self) -> anyhow::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("network unreachable");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IRemoteStore for MemoryRemote {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.ensure_online()
    }

    async fn upload_file(&self, path: &str, content: &[u8], _content_type: &str) -> anyhow::Result<()> {
        self.ensure_online()?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            anyhow::bail!("507 Insufficient Storage: {path}");
        }
        self.put(path, content);
        Ok(())
    }

    async fn download_file(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.ensure_online()?;
        if self.fail_downloads.load(Ordering::SeqCst) {
            anyhow::bail!("503 Service Unavailable: {path}");
        }
        self.read(path)
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {path}"))
    }

    async fn list_files(&self, dir: &str, _use_cache: bool) -> anyhow::Result<Vec<WebDavFileInfo>> {
        self.ensure_online()?;
        let prefix = format!("{dir}/");
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(path, file)| {
                let name = path.strip_prefix(&prefix)?;
                Some(WebDavFileInfo {
                    name: name.to_string(),
                    path: path.clone(),
                    size: file.bytes.len() as u64,
                    last_modified: Some(file.modified),
                    etag: None,
                })
            })
            .collect())
    }

    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        self.ensure_online()?;
        self.remove(path);
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> anyhow::Result<bool> {
        self.ensure_online()?;
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn test_connection(&self) -> anyhow::Result<bool> {
        Ok(!self.offline.load(Ordering::SeqCst))
    }
}

// ============================================================================
// StalledRemote
// ============================================================================

/// Remote whose every request hangs, like a server that accepted the
/// connection and never answers
#[derive(Default)]
pub struct StalledRemote {
    requests: std::sync::atomic::AtomicUsize,
}

impl StalledRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Requests that have been started so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    async fn hang<T>(&self) -> anyhow::Result<T> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[async_trait::async_trait]
impl IRemoteStore for StalledRemote {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.hang().await
    }

    async fn upload_file(&self, _path: &str, _content: &[u8], _content_type: &str) -> anyhow::Result<()> {
        self.hang().await
    }

    async fn download_file(&self, _path: &str) -> anyhow::Result<Vec<u8>> {
        self.hang().await
    }

    async fn list_files(&self, _dir: &str, _use_cache: bool) -> anyhow::Result<Vec<WebDavFileInfo>> {
        self.hang().await
    }

    async fn delete_file(&self, _path: &str) -> anyhow::Result<()> {
        self.hang().await
    }

    async fn file_exists(&self, _path: &str) -> anyhow::Result<bool> {
        self.hang().await
    }

    async fn test_connection(&self) -> anyhow::Result<bool> {
        self.hang().await
    }
}

// ============================================================================
// Devices
// ============================================================================

pub struct Device {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub store: Arc<SqliteLocalStore>,
    pub images: Arc<FsImageStore>,
    pub queue: Arc<SqliteSyncQueueRepository>,
    pub deletions: Arc<SqliteDeletionLogRepository>,
    pub state: Arc<SqliteSyncStateStore>,
    pub id: DeviceId,
    pub dir: TempDir,
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        enabled: true,
        auto_sync_enabled: true,
        device_name: "test-device".into(),
        upload_concurrency: 2,
        download_concurrency: 2,
        max_retries: 5,
        queue_batch_size: 10,
        deletion_retention: Duration::days(30),
    }
}

pub async fn device(remote: Option<Arc<MemoryRemote>>) -> Device {
    device_with(remote, settings()).await
}

pub async fn device_with(remote: Option<Arc<MemoryRemote>>, settings: SyncSettings) -> Device {
    device_on(remote.map(|r| r as Arc<dyn IRemoteStore>), settings).await
}

/// A device wired to any remote implementation
pub async fn device_on(remote: Option<Arc<dyn IRemoteStore>>, settings: SyncSettings) -> Device {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let dir = TempDir::new().unwrap();
    let id = DeviceId::new();

    let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
    let images = Arc::new(FsImageStore::new(dir.path().join("images")));
    let queue = Arc::new(SqliteSyncQueueRepository::new(pool.pool().clone()));
    let deletions = Arc::new(SqliteDeletionLogRepository::new(pool.pool().clone()));
    let state = Arc::new(SqliteSyncStateStore::new(pool.pool().clone()));

    let ports = SyncPorts {
        local: store.clone(),
        remote,
        images: images.clone(),
        queue: queue.clone(),
        deletions: deletions.clone(),
        watermark: state.clone(),
    };
    let orchestrator = Arc::new(SyncOrchestrator::with_settings(ports, settings, id));

    Device {
        orchestrator,
        store,
        images,
        queue,
        deletions,
        state,
        id,
        dir,
    }
}

// ============================================================================
// Note fixtures
// ============================================================================

pub fn stroke(id: &str, page_id: &str) -> Stroke {
    let now = Utc::now();
    Stroke {
        id: id.to_string(),
        page_id: page_id.to_string(),
        size: 3.0,
        pen: Pen::Ballpen,
        color: -16777216,
        top: 1.0,
        bottom: 20.0,
        left: 2.0,
        right: 40.0,
        points: vec![
            StrokePoint {
                x: 2.0,
                y: 1.0,
                pressure: 0.4,
                size: 3.0,
                tilt_x: 0,
                tilt_y: 0,
                timestamp: now.timestamp_millis(),
            },
            StrokePoint {
                x: 40.0,
                y: 20.0,
                pressure: 0.6,
                size: 3.0,
                tilt_x: 1,
                tilt_y: -1,
                timestamp: now.timestamp_millis() + 16,
            },
        ],
        created_at: now,
        updated_at: now,
    }
}

/// Insert a notebook with one stroke on each page
pub async fn seed_notebook(store: &SqliteLocalStore, id: &str, title: &str, pages: &[&str]) -> Notebook {
    let mut notebook = Notebook::new(id, title);
    notebook.page_ids = pages.iter().map(|p| p.to_string()).collect();
    store.insert_notebook(&notebook).await.unwrap();
    for page_id in pages {
        store
            .upsert_page(&Page::new(*page_id, Some(id.to_string())))
            .await
            .unwrap();
        store
            .insert_stroke(&stroke(&format!("{page_id}-s1"), page_id))
            .await
            .unwrap();
    }
    notebook
}

/// Rewrite a page's strokes as an edit made at `at`
pub async fn edit_page(store: &SqliteLocalStore, page_id: &str, stroke_id: &str, at: DateTime<Utc>) {
    let mut page = store.get_page_by_id(page_id).await.unwrap().unwrap();
    page.updated_at = at;
    store.upsert_page(&page).await.unwrap();
    store.delete_strokes_by_page_id(page_id).await.unwrap();
    store.insert_stroke(&stroke(stroke_id, page_id)).await.unwrap();
}

pub async fn stroke_ids(store: &SqliteLocalStore, page_id: &str) -> Vec<String> {
    store
        .get_strokes_by_page_id(page_id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect()
}
