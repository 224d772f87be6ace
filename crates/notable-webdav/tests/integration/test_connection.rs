//! Bootstrap of the remote layout and connectivity probes

use notable_core::ports::IRemoteStore;
use wiremock::{
    matchers::{method, path, path_regex},
    Mock, ResponseTemplate,
};

use crate::common::{self, SYNC_ROOT};

const EMPTY_MULTISTATUS: &str =
    r#"<d:multistatus xmlns:d="DAV:"><d:response><d:href>/dav/</d:href></d:response></d:multistatus>"#;

#[tokio::test]
async fn initialize_creates_every_missing_directory() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .and(path_regex(r"^/dav/notable-sync/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("MKCOL"))
        .and(path_regex(r"^/dav/notable-sync/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(5)
        .mount(&server)
        .await;

    store.initialize().await.unwrap();

    let mut created: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "MKCOL")
        .map(|r| r.url.path().to_string())
        .collect();
    created.sort();
    assert_eq!(
        created,
        vec![
            format!("{SYNC_ROOT}/"),
            format!("{SYNC_ROOT}/devices/"),
            format!("{SYNC_ROOT}/images/"),
            format!("{SYNC_ROOT}/notebooks/"),
            format!("{SYNC_ROOT}/pages/"),
        ]
    );
}

#[tokio::test]
async fn initialize_skips_existing_directories() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(207).set_body_string(EMPTY_MULTISTATUS))
        .mount(&server)
        .await;
    Mock::given(method("MKCOL"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    store.initialize().await.unwrap();
}

#[tokio::test]
async fn mkcol_method_not_allowed_means_exists() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("MKCOL"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    store.initialize().await.unwrap();
}

#[tokio::test]
async fn initialize_fails_on_forbidden() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    assert!(store.initialize().await.is_err());
}

#[tokio::test]
async fn connection_ok_before_first_sync() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/"))
        .respond_with(ResponseTemplate::new(207).set_body_string(EMPTY_MULTISTATUS))
        .mount(&server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path(format!("{SYNC_ROOT}/")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(store.test_connection().await.unwrap());
}

#[tokio::test]
async fn connection_fails_on_bad_credentials() {
    let (server, store) = common::setup_store().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(!store.test_connection().await.unwrap());
}

#[tokio::test]
async fn connection_fails_when_server_unreachable() {
    let (server, store) = common::setup_store().await;
    drop(server);

    assert!(!store.test_connection().await.unwrap());
}
