//! End-to-end sync tests: two or more devices sharing one in-memory remote

mod common;

use chrono::{Duration, SubsecRound, Utc};

use common::{device, device_with, edit_page, seed_notebook, settings, stroke_ids, MemoryRemote};
use notable_core::domain::{
    DeletionType, DeviceId, Image, Notebook, Page, SyncOperation, SyncOutcome, SyncWatermark,
};
use notable_core::ports::{
    IDeletionLogRepository, IImageStore, ILocalStore, ISyncQueueRepository, IWatermarkStore,
};
use notable_sync::serializer::{LocalImage, PageSnapshot};
use notable_sync::SyncSerializer;

// ============================================================================
// Gating
// ============================================================================

#[tokio::test]
async fn no_remote_is_not_configured() {
    let d = device(None).await;
    assert_eq!(d.orchestrator.sync_bidirectional().await, SyncOutcome::NotConfigured);
    assert_eq!(d.orchestrator.pull_changes().await, SyncOutcome::NotConfigured);
    assert_eq!(d.orchestrator.process_queue().await, SyncOutcome::NotConfigured);
    assert!(!d.orchestrator.test_connection().await);
}

#[tokio::test]
async fn disabled_sync_touches_nothing() {
    let remote = MemoryRemote::new();
    let mut s = settings();
    s.enabled = false;
    let d = device_with(Some(remote.clone()), s).await;
    seed_notebook(&d.store, "nb1", "Notes", &["p1"]).await;

    assert_eq!(d.orchestrator.sync_bidirectional().await, SyncOutcome::Disabled);
    assert_eq!(d.orchestrator.replace_server_with_local().await, SyncOutcome::Disabled);
    assert_eq!(remote.file_count(), 0);
}

#[tokio::test]
async fn auto_sync_short_circuits() {
    let remote = MemoryRemote::new();
    let mut s = settings();
    s.auto_sync_enabled = false;
    let d = device_with(Some(remote.clone()), s).await;
    seed_notebook(&d.store, "nb1", "Notes", &["p1"]).await;
    assert_eq!(d.orchestrator.auto_sync_notebook("nb1").await, SyncOutcome::Disabled);

    let d = device(Some(remote.clone())).await;
    seed_notebook(&d.store, "nb1", "Notes", &["p1"]).await;
    remote.set_offline(true);
    assert_eq!(d.orchestrator.auto_sync_notebook("nb1").await, SyncOutcome::Error);
    assert_eq!(remote.file_count(), 0);

    remote.set_offline(false);
    assert_eq!(
        d.orchestrator.auto_sync_notebook("missing").await,
        SyncOutcome::NotebookNotFound
    );
    let handle = d.orchestrator.spawn_auto_sync("nb1");
    assert_eq!(handle.await.unwrap(), Some(SyncOutcome::Success));
    assert_eq!(remote.names("pages").len(), 1);
}

// ============================================================================
// Two-device convergence
// ============================================================================

#[tokio::test]
async fn fresh_device_receives_everything() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Physics", &["p1", "p2"]).await;

    assert_eq!(a.orchestrator.sync_bidirectional().await, SyncOutcome::Success);
    assert_eq!(remote.names("pages").len(), 2);
    assert_eq!(remote.names("notebooks").len(), 1);
    assert!(remote.names("devices").contains(&format!("{}.json", a.id)));

    assert_eq!(b.orchestrator.sync_bidirectional().await, SyncOutcome::Success);
    let notebook = b.store.get_notebook_by_id("nb1").await.unwrap().unwrap();
    assert_eq!(notebook.title, "Physics");
    assert_eq!(notebook.page_ids, vec!["p1".to_string(), "p2".to_string()]);
    assert_eq!(stroke_ids(&b.store, "p2").await, vec!["p2-s1".to_string()]);
    assert!(!b.state.get().await.unwrap().is_zero());

    // Nothing changed anywhere since the last cycle.
    assert_eq!(b.orchestrator.sync_bidirectional().await, SyncOutcome::UpToDate);
    assert_eq!(a.orchestrator.sync_bidirectional().await, SyncOutcome::UpToDate);
}

#[tokio::test]
async fn newest_edit_wins_on_both_devices() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Shared", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;
    b.orchestrator.sync_bidirectional().await;

    // Edits land in distinct wire seconds.
    let now = Utc::now();
    edit_page(&a.store, "p1", "from-a", now + Duration::seconds(10)).await;
    assert!(a.orchestrator.sync_bidirectional().await.is_terminal_success());

    edit_page(&b.store, "p1", "from-b", now + Duration::seconds(20)).await;
    assert!(b.orchestrator.sync_bidirectional().await.is_terminal_success());
    // A's older edit did not overwrite B's newer one.
    assert_eq!(stroke_ids(&b.store, "p1").await, vec!["from-b".to_string()]);

    assert!(a.orchestrator.sync_bidirectional().await.is_terminal_success());
    assert_eq!(stroke_ids(&a.store, "p1").await, vec!["from-b".to_string()]);
}

#[tokio::test]
async fn offline_edits_converge_when_older_edit_syncs_first() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Shared", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;
    b.orchestrator.sync_bidirectional().await;

    // Both edit while offline; B's edit is the newer one.
    let now = Utc::now();
    edit_page(&a.store, "p1", "from-a", now + Duration::seconds(10)).await;
    edit_page(&b.store, "p1", "from-b", now + Duration::seconds(20)).await;

    // A reconnects first and publishes the losing edit.
    assert!(a.orchestrator.sync_bidirectional().await.is_terminal_success());
    assert_eq!(stroke_ids(&a.store, "p1").await, vec!["from-a".to_string()]);

    assert!(b.orchestrator.sync_bidirectional().await.is_terminal_success());
    assert_eq!(stroke_ids(&b.store, "p1").await, vec!["from-b".to_string()]);

    assert!(a.orchestrator.sync_bidirectional().await.is_terminal_success());
    assert_eq!(stroke_ids(&a.store, "p1").await, vec!["from-b".to_string()]);
}

#[tokio::test]
async fn same_second_edits_converge() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Shared", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;
    b.orchestrator.sync_bidirectional().await;

    // Both edits fall inside one wire second.
    let second = (Utc::now() + Duration::seconds(30)).trunc_subsecs(0);
    edit_page(&b.store, "p1", "from-b", second + Duration::milliseconds(200)).await;
    edit_page(&a.store, "p1", "from-a", second + Duration::milliseconds(800)).await;

    for _ in 0..2 {
        assert!(b.orchestrator.sync_bidirectional().await.is_terminal_success());
        assert!(a.orchestrator.sync_bidirectional().await.is_terminal_success());
    }

    let winner = if a.id.to_string() > b.id.to_string() {
        "from-a"
    } else {
        "from-b"
    };
    assert_eq!(stroke_ids(&a.store, "p1").await, vec![winner.to_string()]);
    assert_eq!(stroke_ids(&b.store, "p1").await, vec![winner.to_string()]);
}

#[tokio::test]
async fn own_uploads_are_never_reimported() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Mine", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;

    let page = a.store.get_page_by_id("p1").await.unwrap().unwrap();
    let file = remote.names("pages").remove(0);
    let json = String::from_utf8(remote.read(&format!("pages/{file}")).unwrap()).unwrap();
    let decoded = SyncSerializer::new(DeviceId::new()).decode_page(&json).unwrap();
    assert_eq!(decoded.device_id, a.id.to_string());
    assert!(!a.orchestrator.should_import_page(&decoded).await.unwrap());
    assert!(page.same_content(&decoded.page));
}

#[tokio::test]
async fn empty_store_with_watermark_downloads_everything() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Old", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;

    // Reinstalled app: state survived, notes did not.
    b.state.set(SyncWatermark::now()).await.unwrap();
    assert_eq!(b.orchestrator.pull_changes().await, SyncOutcome::Success);
    assert!(b.store.get_page_by_id("p1").await.unwrap().is_some());
}

// ============================================================================
// Queue
// ============================================================================

#[tokio::test]
async fn failed_upload_is_queued_and_replayed() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Offline", &["p1"]).await;

    remote.set_fail_uploads(true);
    assert_eq!(a.orchestrator.sync_bidirectional().await, SyncOutcome::Error);
    assert!(a.state.get().await.unwrap().is_zero(), "watermark must not move");
    let status = a.orchestrator.queue_status().await.unwrap();
    assert_eq!(status.pending, 1);
    let entries = a.queue.get_all().await.unwrap();
    assert_eq!(entries[0].operation, SyncOperation::UploadNotebook);

    // Still failing: one rung up the ladder, not ready again for a minute.
    assert_eq!(a.orchestrator.process_queue().await, SyncOutcome::Error);
    let entries = a.queue.get_all().await.unwrap();
    assert_eq!(entries[0].retry_count, 1);
    assert_eq!(a.orchestrator.process_queue().await, SyncOutcome::UpToDate);

    remote.set_fail_uploads(false);
    assert_eq!(a.orchestrator.sync_bidirectional().await, SyncOutcome::Success);
    assert_eq!(remote.names("notebooks").len(), 1);
    // The in-line success superseded the queued entry.
    assert_eq!(a.orchestrator.queue_status().await.unwrap().total, 0);
}

#[tokio::test]
async fn partial_pull_keeps_watermark() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Shared", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;
    assert_eq!(b.orchestrator.sync_bidirectional().await, SyncOutcome::Success);
    let before = b.state.get().await.unwrap();

    edit_page(&a.store, "p1", "from-a", Utc::now() + Duration::seconds(10)).await;
    a.orchestrator.sync_bidirectional().await;
    remote.put("pages/nb1_p9_1700000000000.json", b"{ not json");

    assert_eq!(
        b.orchestrator.sync_bidirectional().await,
        SyncOutcome::PartialSuccess
    );
    assert_eq!(stroke_ids(&b.store, "p1").await, vec!["from-a".to_string()]);
    assert_eq!(b.state.get().await.unwrap(), before);
}

#[tokio::test]
async fn failed_pull_keeps_watermark() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Shared", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;
    b.orchestrator.sync_bidirectional().await;
    let before = b.state.get().await.unwrap();

    edit_page(&a.store, "p1", "from-a", Utc::now() + Duration::seconds(10)).await;
    a.orchestrator.sync_bidirectional().await;

    remote.set_fail_downloads(true);
    assert_eq!(b.orchestrator.sync_bidirectional().await, SyncOutcome::Error);
    assert_eq!(b.state.get().await.unwrap(), before);
    assert_eq!(stroke_ids(&b.store, "p1").await, vec!["p1-s1".to_string()]);
}

#[tokio::test]
async fn retry_queued_operations_reports_up_to_date_when_empty() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote)).await;
    assert_eq!(a.orchestrator.retry_queued_operations().await, SyncOutcome::UpToDate);
}

#[tokio::test]
async fn exhausted_entries_go_dormant_until_revived() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let queue = a.orchestrator.queue();
    let t0 = Utc::now();
    let mut entry = queue
        .enqueue_at(SyncOperation::UploadNotebook, "nb1", Some("{}".into()), t0)
        .await
        .unwrap();

    let mut now = t0;
    for attempt in 1..=5 {
        entry = queue.mark_failed_at(&entry, "HTTP 500", now).await.unwrap();
        assert_eq!(entry.retry_count, attempt);
        now += Duration::hours(2);
    }
    assert!(entry.is_exhausted());
    assert!(entry.next_retry_at.is_none());

    let status = a.orchestrator.queue_status().await.unwrap();
    assert_eq!((status.pending, status.failed), (0, 1));
    assert!(queue.get_ready_for_retry_at(now, 10).await.unwrap().is_empty());

    assert_eq!(a.orchestrator.clear_failed_queue_entries().await.unwrap(), 1);
    assert_eq!(a.orchestrator.queue_status().await.unwrap().total, 0);
}

#[tokio::test]
async fn backoff_ladder_schedules_retries() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote)).await;
    let queue = a.orchestrator.queue();
    let t0 = Utc::now();
    let entry = queue
        .enqueue_at(SyncOperation::UploadPage, "p1", Some("{}".into()), t0)
        .await
        .unwrap();
    let entry = queue.mark_failed_at(&entry, "timeout", t0).await.unwrap();

    let soon = queue
        .get_ready_for_retry_at(t0 + Duration::seconds(30), 10)
        .await
        .unwrap();
    assert!(soon.is_empty());
    let later = queue
        .get_ready_for_retry_at(t0 + Duration::seconds(61), 10)
        .await
        .unwrap();
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].id, entry.id);
}

#[tokio::test]
async fn failed_download_is_queued_and_replayed() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Later", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;

    remote.set_fail_downloads(true);
    assert_eq!(b.orchestrator.pull_changes().await, SyncOutcome::Error);
    let entries = b.queue.get_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, SyncOperation::DownloadPage);
    assert_eq!(entries[0].target_id, "p1");

    remote.set_fail_downloads(false);
    assert_eq!(b.orchestrator.process_queue().await, SyncOutcome::Success);
    assert_eq!(stroke_ids(&b.store, "p1").await, vec!["p1-s1".to_string()]);
    assert!(b.store.get_notebook_by_id("nb1").await.unwrap().is_some());
}

// ============================================================================
// Deletions
// ============================================================================

#[tokio::test]
async fn deleted_notebook_is_removed_from_remote() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Scratch", &["p1", "p2"]).await;
    a.orchestrator.sync_bidirectional().await;
    assert_eq!(remote.names("pages").len(), 2);

    a.orchestrator.delete_notebook("nb1").await.unwrap();
    assert!(a.store.get_page_by_id("p1").await.unwrap().is_none());
    assert!(a.orchestrator.has_local_changes().await.is_ok());

    a.orchestrator.sync_bidirectional().await;
    assert!(remote.names("pages").is_empty());
    assert!(remote.names("notebooks").is_empty());
    assert!(a.deletions.get_unsynced().await.unwrap().is_empty());
    // Full download after emptying the store must not bring the notebook back.
    assert!(a.store.get_notebook_by_id("nb1").await.unwrap().is_none());
}

#[tokio::test]
async fn tombstone_blocks_older_remote_copy() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Shared", &["p1"]).await;
    a.orchestrator.sync_bidirectional().await;
    b.orchestrator.sync_bidirectional().await;

    // B deletes p1; the tombstone stays unsynced because B never pushes.
    b.store.delete_page("p1").await.unwrap();
    b.deletions
        .insert(&notable_core::domain::DeletionLogEntry::new(
            "p1",
            DeletionType::Page,
            b.id,
            Utc::now(),
        ))
        .await
        .unwrap();

    // A adds a page, which re-uploads p1 with its old updatedAt.
    let mut notebook = a.store.get_notebook_by_id("nb1").await.unwrap().unwrap();
    notebook.page_ids.push("p2".into());
    a.store.update_notebook(&notebook).await.unwrap();
    let mut p2 = Page::new("p2", Some("nb1".into()));
    p2.updated_at = Utc::now() + Duration::seconds(5);
    a.store.upsert_page(&p2).await.unwrap();
    a.orchestrator.sync_bidirectional().await;

    b.orchestrator.pull_changes().await;
    assert!(b.store.get_page_by_id("p1").await.unwrap().is_none());
    assert!(b.store.get_page_by_id("p2").await.unwrap().is_some());
    let notebook = b.store.get_notebook_by_id("nb1").await.unwrap().unwrap();
    assert_eq!(notebook.page_ids, vec!["p2".to_string()]);
}

// ============================================================================
// Full replacement
// ============================================================================

#[tokio::test]
async fn replace_local_restores_own_uploads() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Backup", &["p1", "p2"]).await;
    a.orchestrator.sync_bidirectional().await;

    // Local junk that never reached the server disappears.
    seed_notebook(&a.store, "junk", "Junk", &["j1"]).await;
    assert_eq!(a.orchestrator.replace_local_with_server().await, SyncOutcome::Success);

    assert!(a.store.get_notebook_by_id("junk").await.unwrap().is_none());
    let notebook = a.store.get_notebook_by_id("nb1").await.unwrap().unwrap();
    assert_eq!(notebook.page_ids, vec!["p1".to_string(), "p2".to_string()]);
    assert_eq!(stroke_ids(&a.store, "p1").await, vec!["p1-s1".to_string()]);
    assert!(!a.state.get().await.unwrap().is_zero());
}

#[tokio::test]
async fn replace_server_leaves_only_local_data() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&b.store, "other", "Theirs", &["o1"]).await;
    b.orchestrator.sync_bidirectional().await;

    seed_notebook(&a.store, "mine", "Mine", &["m1"]).await;
    assert_eq!(a.orchestrator.replace_server_with_local().await, SyncOutcome::Success);

    let pages = remote.names("pages");
    assert_eq!(pages.len(), 1);
    assert!(pages[0].starts_with("mine_m1_"));
    assert_eq!(remote.names("devices"), vec![format!("{}.json", a.id)]);
}

// ============================================================================
// Images
// ============================================================================

fn image(id: &str, page_id: &str, uri: Option<String>) -> Image {
    let now = Utc::now();
    Image {
        id: id.to_string(),
        page_id: page_id.to_string(),
        x: 10,
        y: 20,
        width: 300,
        height: 200,
        uri,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn images_travel_inline_and_as_objects() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote.clone())).await;
    let b = device(Some(remote.clone())).await;
    seed_notebook(&a.store, "nb1", "Pictures", &["p1"]).await;
    let uri = a.images.write("cat.png", b"\x89PNG-cat").await.unwrap();
    a.store.insert_image(&image("img1", "p1", Some(uri))).await.unwrap();

    assert_eq!(a.orchestrator.sync_bidirectional().await, SyncOutcome::Success);
    assert_eq!(remote.names("images"), vec!["img1_cat.png".to_string()]);

    b.orchestrator.sync_bidirectional().await;
    let images = b.store.get_images_by_page_id("p1").await.unwrap();
    assert_eq!(images.len(), 1);
    let local_uri = images[0].uri.clone().unwrap();
    assert!(local_uri.ends_with("img1_cat.png"));
    assert_eq!(b.images.read(&local_uri).await.unwrap().unwrap(), b"\x89PNG-cat");
}

#[tokio::test]
async fn missing_image_object_is_fetched_later() {
    let remote = MemoryRemote::new();
    let b = device(Some(remote.clone())).await;

    // Another client published a page whose image is referenced, not inlined.
    let other = SyncSerializer::new(DeviceId::new());
    let mut notebook = Notebook::new("nb1", "Remote");
    notebook.page_ids = vec!["p1".into()];
    let snapshot = PageSnapshot {
        notebook: Some(notebook),
        page: Page::new("p1", Some("nb1".into())),
        strokes: Vec::new(),
        images: vec![LocalImage {
            image: image("img9", "p1", Some("file:///sdcard/dog.jpg".into())),
            data: None,
        }],
        background: None,
        folder_path: Vec::new(),
    };
    let now = Utc::now();
    let json = other.encode_page(&snapshot, now).unwrap();
    remote.put(
        &format!("pages/nb1_p1_{}.json", now.timestamp_millis()),
        json.as_bytes(),
    );

    assert_eq!(b.orchestrator.pull_changes().await, SyncOutcome::Success);
    let entries = b.queue.get_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, SyncOperation::DownloadImage);
    assert_eq!(entries[0].payload.as_deref(), Some("img9_dog.jpg"));

    let stored = b.store.get_images_by_page_id("p1").await.unwrap();
    let uri = stored[0].uri.clone().unwrap();
    assert!(b.images.read(&uri).await.unwrap().is_none());

    remote.put("images/img9_dog.jpg", b"woof");
    assert_eq!(b.orchestrator.process_queue().await, SyncOutcome::Success);
    assert_eq!(b.images.read(&uri).await.unwrap().unwrap(), b"woof");
}

// ============================================================================
// Diagnostics
// ============================================================================

#[tokio::test]
async fn sync_log_records_cycle() {
    let remote = MemoryRemote::new();
    let a = device(Some(remote)).await;
    a.orchestrator.sync_bidirectional().await;
    let log = a.orchestrator.sync_log().formatted();
    assert!(log.iter().any(|line| line.contains("Starting bidirectional sync")));
}
