//! Images placed on a page

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An image placed on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub page_id: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Location of the image bytes on this device, if any
    pub uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Image {
    /// Last path segment of the URI, used as the remote and local file name
    pub fn file_name(&self) -> Option<&str> {
        self.uri.as_deref().and_then(file_name_of)
    }
}

/// Last path segment of a `file://` URI or plain path
pub fn file_name_of(uri: &str) -> Option<&str> {
    let trimmed = uri.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if name.is_empty() || name == "file:" {
        None
    } else {
        Some(name)
    }
}

/// MIME type guessed from the file extension; PNG when unknown
pub fn mime_type_for(uri: Option<&str>) -> &'static str {
    let Some(uri) = uri else {
        return "image/png";
    };
    let lower = uri.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/png"
    }
}
