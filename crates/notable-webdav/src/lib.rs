//! Notable WebDAV - remote store adapter
//!
//! Provides the async WebDAV transport used by the sync engine:
//! - Gzip-compressed uploads with transparent decompression on download
//! - Depth 1 PROPFIND listings behind a TTL cache
//! - Directory bootstrap with MKCOL
//! - Password storage in the system keyring
//!
//! ## Modules
//!
//! - [`client`] - HTTP client speaking WebDAV verbs
//! - [`cache`] - Per-directory listing cache with TTL
//! - [`compression`] - Gzip helpers
//! - [`credentials`] - Keyring-backed password storage
//! - [`propfind`] - Multistatus response parsing
//! - [`store`] - `IRemoteStore` implementation

pub mod cache;
pub mod client;
pub mod compression;
pub mod credentials;
pub mod propfind;
pub mod store;

use reqwest::StatusCode;
use thiserror::Error;

pub use cache::ListingCache;
pub use client::WebDavClient;
pub use credentials::KeyringCredentialStorage;
pub use store::WebDavRemoteStore;

/// Errors that can occur when talking to a WebDAV server
#[derive(Debug, Error)]
pub enum WebDavError {
    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to touch the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {path}")]
    ServerError { status: u16, path: String },

    /// Any other non-success status
    #[error("Unexpected status {status} for {path}")]
    UnexpectedStatus { status: u16, path: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The server URL could not be used
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Compressing or inflating a payload failed
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),
}

impl WebDavError {
    /// Map a non-success status to an error
    pub fn from_status(status: StatusCode, path: &str) -> Self {
        let path = path.to_string();
        match status {
            StatusCode::UNAUTHORIZED => WebDavError::Unauthorized(path),
            StatusCode::FORBIDDEN => WebDavError::Forbidden(path),
            StatusCode::NOT_FOUND => WebDavError::NotFound(path),
            s if s.is_server_error() => WebDavError::ServerError {
                status: s.as_u16(),
                path,
            },
            s => WebDavError::UnexpectedStatus {
                status: s.as_u16(),
                path,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WebDavError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            WebDavError::from_status(StatusCode::UNAUTHORIZED, "/x"),
            WebDavError::Unauthorized(_)
        ));
        assert!(matches!(
            WebDavError::from_status(StatusCode::FORBIDDEN, "/x"),
            WebDavError::Forbidden(_)
        ));
        assert!(WebDavError::from_status(StatusCode::NOT_FOUND, "/x").is_not_found());
        assert!(matches!(
            WebDavError::from_status(StatusCode::BAD_GATEWAY, "/x"),
            WebDavError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            WebDavError::from_status(StatusCode::CONFLICT, "/x"),
            WebDavError::UnexpectedStatus { status: 409, .. }
        ));
    }
}
