//! Integration tests for notable-webdav
//!
//! Uses wiremock to simulate a WebDAV server and verifies end-to-end
//! behavior of uploads, downloads, listings, deletes and bootstrap.

mod common;

mod test_connection;
mod test_listing;
mod test_transfer;
