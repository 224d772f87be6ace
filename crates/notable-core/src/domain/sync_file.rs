//! Remote layout and file naming
//!
//! Every upload embeds its timestamp in the file name, so two devices never
//! write the same object and readers can order versions without trusting
//! server metadata.
//!
//! ```text
//! notable-sync/
//!   devices/{deviceId}.json
//!   notebooks/{notebookId}_{millis}.json
//!   pages/{notebookId}_{pageId}_{millis}.json
//!   pages/standalone_{pageId}_{millis}.json
//!   images/{imageId}_{fileName}
//! ```

use chrono::{DateTime, Utc};

/// Root collection of the sync tree on the server
pub const SYNC_ROOT: &str = "notable-sync";
pub const DEVICES_DIR: &str = "devices";
pub const NOTEBOOKS_DIR: &str = "notebooks";
pub const PAGES_DIR: &str = "pages";
pub const IMAGES_DIR: &str = "images";

/// Notebook slot used in file names of pages without a notebook
pub const STANDALONE_SLOT: &str = "standalone";

const JSON_SUFFIX: &str = ".json";

pub fn page_file_name(notebook_id: &str, page_id: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}{}", notebook_id, page_id, at.timestamp_millis(), JSON_SUFFIX)
}

pub fn standalone_page_file_name(page_id: &str, at: DateTime<Utc>) -> String {
    page_file_name(STANDALONE_SLOT, page_id, at)
}

pub fn notebook_file_name(notebook_id: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}{}", notebook_id, at.timestamp_millis(), JSON_SUFFIX)
}

pub fn device_file_name(device_id: &str) -> String {
    format!("{}{}", device_id, JSON_SUFFIX)
}

pub fn image_file_name(image_id: &str, file_name: &str) -> String {
    format!("{}_{}", image_id, file_name)
}

/// Path of `name` inside one of the sync directories
pub fn remote_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir, name)
}

/// What a remote JSON file holds, judged by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFileType {
    Page,
    Notebook,
    Device,
}

/// Identifiers recovered from a remote file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFileInfo {
    pub kind: SyncFileType,
    pub notebook_id: Option<String>,
    pub page_id: Option<String>,
    pub device_id: Option<String>,
    /// Upload time in epoch millis; device files carry none
    pub timestamp: Option<i64>,
}

impl SyncFileInfo {
    /// Page file with the `standalone` notebook slot
    pub fn is_standalone(&self) -> bool {
        self.kind == SyncFileType::Page && self.notebook_id.as_deref() == Some(STANDALONE_SLOT)
    }
}

/// Classify a file name by its underscore count
///
/// Two or more underscores is a page, one is notebook metadata, none is a
/// device record. Names without the `.json` suffix, or whose timestamp part
/// is not a number, yield `None`.
pub fn parse_file_name(name: &str) -> Option<SyncFileInfo> {
    let stem = name.strip_suffix(JSON_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    let parts: Vec<&str> = stem.split('_').collect();
    match parts.len() {
        1 => Some(SyncFileInfo {
            kind: SyncFileType::Device,
            notebook_id: None,
            page_id: None,
            device_id: Some(stem.to_string()),
            timestamp: None,
        }),
        2 => Some(SyncFileInfo {
            kind: SyncFileType::Notebook,
            notebook_id: Some(parts[0].to_string()),
            page_id: None,
            device_id: None,
            timestamp: Some(parts[1].parse().ok()?),
        }),
        n => {
            let timestamp = parts[n - 1].parse().ok()?;
            Some(SyncFileInfo {
                kind: SyncFileType::Page,
                notebook_id: Some(parts[0].to_string()),
                page_id: Some(parts[1..n - 1].join("_")),
                device_id: None,
                timestamp: Some(timestamp),
            })
        }
    }
}
