//! WebDAV HTTP client
//!
//! Thin typed wrapper over `reqwest` that speaks the WebDAV verbs used by the
//! sync engine (PUT, GET, DELETE, PROPFIND, MKCOL). Paths are relative to the
//! sync root `{server}/notable-sync`; every request carries HTTP basic auth.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use notable_core::config::NetworkConfig;
//! use notable_webdav::client::WebDavClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = WebDavClient::new(
//!     "https://cloud.example.com/remote.php/webdav",
//!     "alice",
//!     "secret",
//!     &NetworkConfig::default(),
//! )?;
//! let entries = client.propfind("pages", 1).await?;
//! println!("{} entries", entries.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use tracing::{debug, trace};

use notable_core::config::NetworkConfig;
use notable_core::domain::sync_file::SYNC_ROOT;

use crate::compression;
use crate::propfind::{parse_multistatus, DavEntry, PROPFIND_BODY};
use crate::WebDavError;

/// HTTP client for one WebDAV account
#[derive(Debug, Clone)]
pub struct WebDavClient {
    client: Client,
    /// Account root without trailing slash
    base_url: String,
    username: String,
    password: String,
}

impl WebDavClient {
    /// Creates a client with the configured connect and request timeouts
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        network: &NetworkConfig,
    ) -> Result<Self, WebDavError> {
        let server_url = server_url.into();
        url::Url::parse(&server_url).map_err(|e| WebDavError::InvalidUrl(e.to_string()))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .timeout(Duration::from_secs(network.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    /// Creates a client with default `reqwest` settings (useful for testing)
    pub fn with_base_url(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Absolute URL of the sync root collection
    pub fn sync_root_url(&self) -> String {
        format!("{}/{}/", self.base_url, SYNC_ROOT)
    }

    /// Absolute URL for a path relative to the sync root
    ///
    /// Each segment is percent-encoded; an empty path is the sync root.
    pub fn url_for(&self, path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return self.sync_root_url();
        }
        let encoded: Vec<String> = trimmed
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        let mut url = format!("{}/{}/{}", self.base_url, SYNC_ROOT, encoded.join("/"));
        if path.ends_with('/') {
            url.push('/');
        }
        url
    }

    /// Creates an authenticated request builder for an absolute URL
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    fn propfind_method() -> Method {
        Method::from_bytes(b"PROPFIND").expect("PROPFIND is a valid method token")
    }

    fn mkcol_method() -> Method {
        Method::from_bytes(b"MKCOL").expect("MKCOL is a valid method token")
    }

    // ========================================================================
    // Verbs
    // ========================================================================

    /// PUT `content` gzip-compressed
    ///
    /// The body is stored compressed as-is; no `Content-Encoding` is sent so
    /// servers do not inflate it on receipt.
    pub async fn put(
        &self,
        path: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<(), WebDavError> {
        let url = self.url_for(path);
        let body = compression::compress(content)?;
        debug!(path, raw = content.len(), compressed = body.len(), "PUT");

        let response = self
            .request(Method::PUT, &url)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WebDavError::from_status(status, path))
        }
    }

    /// GET, inflating gzip bodies
    pub async fn get(&self, path: &str) -> Result<Vec<u8>, WebDavError> {
        let url = self.url_for(path);
        debug!(path, "GET");

        let response = self.request(Method::GET, &url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebDavError::from_status(status, path));
        }
        let bytes = response.bytes().await?.to_vec();
        trace!(path, bytes = bytes.len(), "downloaded");
        Ok(compression::decompress_if_gzip(bytes)?)
    }

    /// DELETE; a missing resource counts as deleted
    pub async fn delete(&self, path: &str) -> Result<(), WebDavError> {
        let url = self.url_for(path);
        debug!(path, "DELETE");

        let response = self.request(Method::DELETE, &url).send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(WebDavError::from_status(status, path))
        }
    }

    /// PROPFIND at `depth` on a path relative to the sync root
    pub async fn propfind(&self, path: &str, depth: u8) -> Result<Vec<DavEntry>, WebDavError> {
        let url = self.url_for(path);
        self.propfind_url(&url, path, depth).await
    }

    async fn propfind_url(
        &self,
        url: &str,
        label: &str,
        depth: u8,
    ) -> Result<Vec<DavEntry>, WebDavError> {
        trace!(url, depth, "PROPFIND");
        let response = self
            .request(Self::propfind_method(), url)
            .header("Depth", depth.to_string())
            .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebDavError::from_status(status, label));
        }
        let body = response.text().await?;
        parse_multistatus(&body)
    }

    /// Whether a resource exists, via a Depth 0 PROPFIND
    pub async fn exists(&self, path: &str) -> Result<bool, WebDavError> {
        match self.propfind(path, 0).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// MKCOL; 405 means the collection already exists
    pub async fn mkcol(&self, path: &str) -> Result<(), WebDavError> {
        let url = self.url_for(path);
        debug!(path, "MKCOL");

        let response = self.request(Self::mkcol_method(), &url).send().await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(WebDavError::from_status(status, path))
        }
    }

    /// Depth 0 PROPFIND on the account root, outside the sync tree
    pub async fn probe_account_root(&self) -> Result<(), WebDavError> {
        let url = format!("{}/", self.base_url);
        self.propfind_url(&url, "/", 0).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_at_sync_dir() {
        let client = WebDavClient::with_base_url("https://dav.example.com/webdav/", "u", "p");
        assert_eq!(client.base_url(), "https://dav.example.com/webdav");
        assert_eq!(
            client.sync_root_url(),
            "https://dav.example.com/webdav/notable-sync/"
        );
        assert_eq!(client.url_for(""), client.sync_root_url());
        assert_eq!(
            client.url_for("pages/nb_p_1.json"),
            "https://dav.example.com/webdav/notable-sync/pages/nb_p_1.json"
        );
        assert_eq!(
            client.url_for("pages/"),
            "https://dav.example.com/webdav/notable-sync/pages/"
        );
    }

    #[test]
    fn extension_verbs_are_sent_verbatim() {
        assert_eq!(WebDavClient::propfind_method().as_str(), "PROPFIND");
        assert_eq!(WebDavClient::mkcol_method().as_str(), "MKCOL");
    }

    #[test]
    fn segments_are_percent_encoded() {
        let client = WebDavClient::with_base_url("http://localhost:8080", "u", "p");
        assert_eq!(
            client.url_for("images/img_my photo.png"),
            "http://localhost:8080/notable-sync/images/img_my%20photo.png"
        );
    }

    #[test]
    fn new_rejects_invalid_url() {
        let err = WebDavClient::new("not a url", "u", "p", &NetworkConfig::default()).unwrap_err();
        assert!(matches!(err, WebDavError::InvalidUrl(_)));
    }

    #[test]
    fn custom_methods_are_valid_tokens() {
        assert_eq!(WebDavClient::propfind_method().as_str(), "PROPFIND");
        assert_eq!(WebDavClient::mkcol_method().as_str(), "MKCOL");
    }
}
