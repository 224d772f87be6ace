//! Upload, download and delete against a mock WebDAV server

use chrono::{TimeZone, Utc};
use notable_core::ports::{IRemoteStore, JSON_CONTENT_TYPE};
use notable_webdav::compression;
use wiremock::{
    matchers::{header, method, path},
    Mock, ResponseTemplate,
};

use crate::common::{self, SYNC_ROOT};

#[tokio::test]
async fn upload_sends_gzip_body_with_basic_auth() {
    let (server, store) = common::setup_store().await;
    common::mount_put(&server, "pages/nb_p_1.json").await;

    store
        .upload_file("pages/nb_p_1.json", br#"{"hello":"world"}"#, JSON_CONTENT_TYPE)
        .await
        .expect("upload failed");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(compression::is_gzip(&request.body));
    assert_eq!(
        compression::decompress_if_gzip(request.body.clone()).unwrap(),
        br#"{"hello":"world"}"#
    );
    let auth = request.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(auth.starts_with("Basic "));
}

#[tokio::test]
async fn upload_page_uses_timestamped_name() {
    let (server, store) = common::setup_store().await;
    common::mount_put(&server, "pages/nb-1_p-1_1700000000000.json").await;

    let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let name = store.upload_page("nb-1", "p-1", "{}", at).await.unwrap();
    assert_eq!(name, "nb-1_p-1_1700000000000.json");
}

#[tokio::test]
async fn download_inflates_compressed_payload() {
    let (server, store) = common::setup_store().await;
    let packed = compression::compress(b"{\"page\":1}").unwrap();
    common::mount_get(&server, "pages/a_b_1.json", packed).await;

    let data = store.download_file("pages/a_b_1.json").await.unwrap();
    assert_eq!(data, b"{\"page\":1}");
}

#[tokio::test]
async fn download_accepts_legacy_uncompressed_payload() {
    let (server, store) = common::setup_store().await;
    common::mount_get(&server, "pages/a_b_2.json", b"{\"legacy\":true}".to_vec()).await;

    let data = store.download_file("pages/a_b_2.json").await.unwrap();
    assert_eq!(data, b"{\"legacy\":true}");
}

#[tokio::test]
async fn download_missing_file_is_an_error() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("GET"))
        .and(path(format!("{SYNC_ROOT}/pages/gone.json")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = store.download_file("pages/gone.json").await.unwrap_err();
    assert!(format!("{err:#}").contains("Not found"));
}

#[tokio::test]
async fn unauthorized_download_reports_status() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = store.download_file("pages/x.json").await.unwrap_err();
    assert!(format!("{err:#}").contains("Unauthorized"));
}

#[tokio::test]
async fn delete_of_missing_file_succeeds() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{SYNC_ROOT}/pages/gone.json")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    store.delete_file("pages/gone.json").await.unwrap();
}

#[tokio::test]
async fn upload_image_skips_existing_object() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .and(path(format!("{SYNC_ROOT}/images/img-1_cat.png")))
        .and(header("Depth", "0"))
        .respond_with(ResponseTemplate::new(207).set_body_string(
            r#"<d:multistatus xmlns:d="DAV:"><d:response><d:href>/x</d:href></d:response></d:multistatus>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let name = store.upload_image("img-1", "cat.png", &[1, 2, 3]).await.unwrap();
    assert_eq!(name, "img-1_cat.png");
}

#[tokio::test]
async fn server_error_on_upload_is_reported() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(507))
        .mount(&server)
        .await;

    let err = store
        .upload_file("pages/a_b_1.json", b"{}", JSON_CONTENT_TYPE)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Server error 507"));
}
