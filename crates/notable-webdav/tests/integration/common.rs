//! Shared test helpers for WebDAV integration tests
//!
//! Each helper mounts mock endpoints on a wiremock server. The account root
//! lives at `/dav`, so the sync tree is under `/dav/notable-sync/`.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notable_webdav::{WebDavClient, WebDavRemoteStore};

pub const SYNC_ROOT: &str = "/dav/notable-sync";

/// Starts a mock server and returns a store pointing at it
pub async fn setup_store() -> (MockServer, WebDavRemoteStore) {
    let server = MockServer::start().await;
    let client = WebDavClient::with_base_url(format!("{}/dav", server.uri()), "alice", "secret");
    let store = WebDavRemoteStore::new(client, chrono::Duration::minutes(5));
    (server, store)
}

/// Multistatus body for a directory listing
///
/// `files` are `(name, size, last_modified)` tuples; the directory itself is
/// always the first response, as real servers send it.
pub fn multistatus(dir: &str, files: &[(&str, u64, &str)]) -> String {
    let mut body = String::from(r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:">"#);
    body.push_str(&format!(
        "<d:response><d:href>{SYNC_ROOT}/{dir}/</d:href><d:propstat><d:prop>\
         <d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat></d:response>"
    ));
    for (name, size, modified) in files {
        body.push_str(&format!(
            "<d:response><d:href>{SYNC_ROOT}/{dir}/{name}</d:href><d:propstat><d:prop>\
             <d:resourcetype/><d:getcontentlength>{size}</d:getcontentlength>\
             <d:getlastmodified>{modified}</d:getlastmodified>\
             <d:getetag>\"etag-{size}\"</d:getetag></d:prop></d:propstat></d:response>"
        ));
    }
    body.push_str("</d:multistatus>");
    body
}

/// Mounts a Depth 1 listing for `dir`, expected to be hit `times` times
pub async fn mount_listing(
    server: &MockServer,
    dir: &str,
    files: &[(&str, u64, &str)],
    times: u64,
) {
    Mock::given(method("PROPFIND"))
        .and(path(format!("{SYNC_ROOT}/{dir}/")))
        .respond_with(ResponseTemplate::new(207).set_body_string(multistatus(dir, files)))
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts a PUT endpoint for a file under the sync root
pub async fn mount_put(server: &MockServer, rel_path: &str) {
    Mock::given(method("PUT"))
        .and(path(format!("{SYNC_ROOT}/{rel_path}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

/// Mounts a GET endpoint serving `body` as-is
pub async fn mount_get(server: &MockServer, rel_path: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("{SYNC_ROOT}/{rel_path}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}
