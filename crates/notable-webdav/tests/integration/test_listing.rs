//! Directory listings and the TTL cache

use std::time::Duration;

use notable_core::ports::{IRemoteStore, JSON_CONTENT_TYPE};
use wiremock::{
    matchers::{header, method, path},
    Mock, ResponseTemplate,
};

use crate::common::{self, SYNC_ROOT};

const MODIFIED: &str = "Tue, 14 Nov 2023 22:13:20 GMT";

#[tokio::test]
async fn listing_skips_collection_and_decodes_names() {
    let (server, store) = common::setup_store().await;
    common::mount_listing(
        &server,
        "pages",
        &[("nb_p_1.json", 10, MODIFIED), ("nb_p%20two_2.json", 20, MODIFIED)],
        1,
    )
    .await;

    let files = store.list_files("pages", false).await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "nb_p_1.json");
    assert_eq!(files[0].path, "pages/nb_p_1.json");
    assert_eq!(files[0].size, 10);
    assert_eq!(files[0].etag.as_deref(), Some("etag-10"));
    assert!(files[0].last_modified.is_some());
    assert_eq!(files[1].name, "nb_p two_2.json");
}

#[tokio::test]
async fn cached_listing_avoids_second_propfind() {
    let (server, store) = common::setup_store().await;
    common::mount_listing(&server, "pages", &[("nb_p_1.json", 10, MODIFIED)], 1).await;

    let first = store.list_files("pages", true).await.unwrap();
    let second = store.list_files("pages/", true).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn bypassing_cache_refetches() {
    let (server, store) = common::setup_store().await;
    common::mount_listing(&server, "notebooks", &[("nb_1.json", 3, MODIFIED)], 2).await;

    store.list_files("notebooks", false).await.unwrap();
    store.list_files("notebooks", false).await.unwrap();
}

#[tokio::test]
async fn upload_invalidates_cached_listing() {
    let (server, store) = common::setup_store().await;
    common::mount_listing(&server, "pages", &[], 2).await;
    common::mount_put(&server, "pages/nb_p_5.json").await;

    store.list_files("pages", true).await.unwrap();
    store
        .upload_file("pages/nb_p_5.json", b"{}", JSON_CONTENT_TYPE)
        .await
        .unwrap();
    store.list_files("pages", true).await.unwrap();
}

#[tokio::test]
async fn listing_outrun_by_upload_is_not_cached() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .and(path(format!("{SYNC_ROOT}/pages/")))
        .respond_with(
            ResponseTemplate::new(207)
                .set_body_string(common::multistatus("pages", &[]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    common::mount_put(&server, "pages/nb_p_5.json").await;

    let upload = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        store
            .upload_file("pages/nb_p_5.json", b"{}", JSON_CONTENT_TYPE)
            .await
    };
    let (listed, uploaded) = tokio::join!(store.list_files("pages", true), upload);
    uploaded.unwrap();

    // The listing predates the upload, so it must not be served later.
    assert!(listed.unwrap().is_empty());
    assert!(store.cache().get("pages").is_none());
}

#[tokio::test]
async fn missing_directory_lists_empty() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .and(path(format!("{SYNC_ROOT}/pages/")))
        .and(header("Depth", "1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(store.list_files("pages", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_page_files_filters_by_notebook() {
    let (server, store) = common::setup_store().await;
    common::mount_listing(
        &server,
        "pages",
        &[
            ("nb1_p1_1.json", 1, MODIFIED),
            ("nb2_p2_1.json", 1, MODIFIED),
            ("nb1_p3_2.json", 1, MODIFIED),
        ],
        1,
    )
    .await;

    let all = store.list_page_files(None).await.unwrap();
    assert_eq!(all.len(), 3);
    let nb1 = store.list_page_files(Some("nb1")).await.unwrap();
    let names: Vec<_> = nb1.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["nb1_p1_1.json", "nb1_p3_2.json"]);
}
