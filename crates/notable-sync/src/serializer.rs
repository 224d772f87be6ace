//! Wire envelope exchanged between devices
//!
//! Every payload carries a [`SyncFormat`] header naming the format version,
//! the encode time and the device that produced it. The envelope for a page
//! is self-contained: notebook, page, strokes, images (with inline bytes when
//! the local file resolves) and the folder path travel together, so one
//! downloaded file can be imported without further remote calls.
//!
//! ## Design Notes
//!
//! - Timestamps use the fixed pattern `YYYY-MM-DDTHH:MM:SSZ` in UTC.
//!   Sub-second precision is dropped on the wire.
//! - Unknown keys are ignored on decode and optional fields carry defaults,
//!   so newer writers stay readable by older readers.
//! - Encoding is pretty-printed JSON; the transport gzips it.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use notable_core::domain::{
    mime_type_for, DeviceId, Folder, Image, Notebook, Page, Pen, Stroke, StrokePoint,
    DEFAULT_NATIVE_TEMPLATE, NATIVE_BACKGROUND_TYPE,
};
use notable_core::ports::ILocalStore;

use crate::SyncError;

/// Envelope version written by this build
pub const SYNC_FORMAT_VERSION: &str = "1.0";

/// Fixed wire pattern for every timestamp
pub const WIRE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Background type whose `background` field names an image file
pub const IMAGE_BACKGROUND_TYPE: &str = "image";

/// Capabilities advertised in the device record
pub const DEVICE_CAPABILITIES: [&str; 2] = ["sync", "render"];

/// `at` as it reads back after a trip through [`WIRE_DATE_FORMAT`]
pub fn to_wire_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}

pub fn format_wire_date(at: &DateTime<Utc>) -> String {
    at.format(WIRE_DATE_FORMAT).to_string()
}

/// Parse a wire timestamp, accepting any RFC 3339 string as a fallback
pub fn parse_wire_date(raw: &str) -> Result<DateTime<Utc>, SyncError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, WIRE_DATE_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| SyncError::InvalidTimestamp(format!("'{raw}': {e}")))
}

mod wire_date {
    use super::*;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_wire_date(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_wire_date(&raw).map_err(serde::de::Error::custom)
    }
}

fn default_version() -> String {
    SYNC_FORMAT_VERSION.to_string()
}

fn default_template() -> String {
    DEFAULT_NATIVE_TEMPLATE.to_string()
}

fn default_background_type() -> String {
    NATIVE_BACKGROUND_TYPE.to_string()
}

fn default_page_order() -> i32 {
    -1
}

fn default_capabilities() -> Vec<String> {
    DEVICE_CAPABILITIES.iter().map(|c| c.to_string()).collect()
}

// ============================================================================
// Wire structs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFormat {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(with = "wire_date")]
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNotebook {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub parent_folder_id: Option<String>,
    #[serde(default = "default_template")]
    pub default_native_template: String,
    #[serde(with = "wire_date")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire_date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPage {
    pub id: String,
    /// Absent for standalone pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    /// Index in the notebook's page list, `-1` when unknown
    #[serde(default = "default_page_order")]
    pub page_order: i32,
    #[serde(default)]
    pub scroll: i32,
    #[serde(default = "default_template")]
    pub background: String,
    #[serde(default = "default_background_type")]
    pub background_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<String>,
    #[serde(with = "wire_date")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire_date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncBoundingBox {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStrokePoint {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub size: f32,
    #[serde(default)]
    pub tilt_x: i32,
    #[serde(default)]
    pub tilt_y: i32,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStroke {
    pub id: String,
    pub size: f32,
    /// Upper-case pen name
    pub pen: String,
    pub color: i32,
    pub bounding_box: SyncBoundingBox,
    pub points: Vec<SyncStrokePoint>,
    #[serde(with = "wire_date")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire_date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncPosition {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncDimensions {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncImage {
    pub id: String,
    pub position: SyncPosition,
    pub dimensions: SyncDimensions,
    #[serde(default)]
    pub uri: Option<String>,
    /// Base64 image bytes
    #[serde(default)]
    pub data: Option<String>,
    pub mime_type: String,
    #[serde(with = "wire_date")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "wire_date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBackgroundImage {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAssets {
    #[serde(default)]
    pub background_image: Option<SyncBackgroundImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFolderPathItem {
    pub id: String,
    pub title: String,
}

/// Self-contained page payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPageData {
    pub sync_format: SyncFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook: Option<SyncNotebook>,
    pub page: SyncPage,
    #[serde(default)]
    pub strokes: Vec<SyncStroke>,
    #[serde(default)]
    pub images: Vec<SyncImage>,
    #[serde(default)]
    pub assets: SyncAssets,
    #[serde(default)]
    pub folder_path: Vec<SyncFolderPathItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNotebookMetadata {
    pub sync_format: SyncFormat,
    pub notebook: SyncNotebook,
    /// Page ids in display order
    #[serde(default)]
    pub page_ids: Vec<String>,
    #[serde(default)]
    pub folder_path: Vec<SyncFolderPathItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDeviceInfo {
    pub device_id: String,
    pub device_name: String,
    #[serde(with = "wire_date")]
    pub last_sync_time: DateTime<Utc>,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

// ============================================================================
// Domain side
// ============================================================================

/// An image together with the bytes behind its URI, when resolvable
#[derive(Debug, Clone, PartialEq)]
pub struct LocalImage {
    pub image: Image,
    pub data: Option<Vec<u8>>,
}

/// Everything read from the local store to encode one page
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub notebook: Option<Notebook>,
    pub page: Page,
    pub strokes: Vec<Stroke>,
    pub images: Vec<LocalImage>,
    /// Bytes of an image background, when the page has one
    pub background: Option<Vec<u8>>,
    /// Root first
    pub folder_path: Vec<Folder>,
}

/// A decoded page envelope in domain terms
#[derive(Debug, Clone)]
pub struct RemotePage {
    /// Device that produced the payload
    pub device_id: String,
    /// Notebook as the remote device had it; `page_ids` is left empty
    pub notebook: Option<Notebook>,
    pub page: Page,
    pub page_order: i32,
    pub strokes: Vec<Stroke>,
    pub images: Vec<LocalImage>,
    pub background: Option<Vec<u8>>,
    pub folder_path: Vec<SyncFolderPathItem>,
}

/// A decoded notebook metadata file in domain terms
#[derive(Debug, Clone)]
pub struct RemoteNotebook {
    pub device_id: String,
    pub notebook: Notebook,
}

// ============================================================================
// SyncSerializer
// ============================================================================

/// Encodes and decodes payloads on behalf of one device
#[derive(Debug, Clone)]
pub struct SyncSerializer {
    device_id: DeviceId,
}

impl SyncSerializer {
    pub fn new(device_id: DeviceId) -> Self {
        Self { device_id }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    fn header(&self, now: DateTime<Utc>) -> SyncFormat {
        SyncFormat {
            version: SYNC_FORMAT_VERSION.to_string(),
            timestamp: now,
            device_id: self.device_id.to_string(),
        }
    }

    pub fn encode_page(
        &self,
        snapshot: &PageSnapshot,
        now: DateTime<Utc>,
    ) -> Result<String, SyncError> {
        let page = &snapshot.page;
        let page_order = snapshot
            .notebook
            .as_ref()
            .and_then(|nb| nb.page_index(&page.id))
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(-1);

        let background_image = snapshot.background.as_ref().map(|bytes| SyncBackgroundImage {
            data: BASE64.encode(bytes),
            mime_type: mime_type_for(Some(&page.background)).to_string(),
        });

        let data = SyncPageData {
            sync_format: self.header(now),
            notebook: snapshot.notebook.as_ref().map(notebook_to_wire),
            page: SyncPage {
                id: page.id.clone(),
                notebook_id: page.notebook_id.clone(),
                page_order,
                scroll: page.scroll,
                background: page.background.clone(),
                background_type: page.background_type.clone(),
                parent_folder_id: page.parent_folder_id.clone(),
                created_at: page.created_at,
                updated_at: page.updated_at,
            },
            strokes: snapshot.strokes.iter().map(stroke_to_wire).collect(),
            images: snapshot.images.iter().map(image_to_wire).collect(),
            assets: SyncAssets { background_image },
            folder_path: folder_path_items(&snapshot.folder_path),
        };
        Ok(serde_json::to_string_pretty(&data)?)
    }

    pub fn decode_page(&self, json: &str) -> Result<RemotePage, SyncError> {
        let data: SyncPageData = serde_json::from_str(json)?;
        page_from_wire(data)
    }

    pub fn encode_notebook(
        &self,
        notebook: &Notebook,
        folder_path: &[Folder],
        now: DateTime<Utc>,
    ) -> Result<String, SyncError> {
        let metadata = SyncNotebookMetadata {
            sync_format: self.header(now),
            notebook: notebook_to_wire(notebook),
            page_ids: notebook.page_ids.clone(),
            folder_path: folder_path_items(folder_path),
        };
        Ok(serde_json::to_string_pretty(&metadata)?)
    }

    pub fn decode_notebook(&self, json: &str) -> Result<RemoteNotebook, SyncError> {
        let metadata: SyncNotebookMetadata = serde_json::from_str(json)?;
        let mut notebook = notebook_from_wire(metadata.notebook);
        notebook.page_ids = metadata.page_ids;
        Ok(RemoteNotebook {
            device_id: metadata.sync_format.device_id,
            notebook,
        })
    }

    pub fn encode_device_info(
        &self,
        device_name: &str,
        last_sync: DateTime<Utc>,
    ) -> Result<String, SyncError> {
        let info = SyncDeviceInfo {
            device_id: self.device_id.to_string(),
            device_name: device_name.to_string(),
            last_sync_time: last_sync,
            capabilities: default_capabilities(),
            version: SYNC_FORMAT_VERSION.to_string(),
        };
        Ok(serde_json::to_string_pretty(&info)?)
    }

    pub fn decode_device_info(&self, json: &str) -> Result<SyncDeviceInfo, SyncError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn notebook_to_wire(notebook: &Notebook) -> SyncNotebook {
    SyncNotebook {
        id: notebook.id.clone(),
        title: notebook.title.clone(),
        parent_folder_id: notebook.parent_folder_id.clone(),
        default_native_template: notebook.default_native_template.clone(),
        created_at: notebook.created_at,
        updated_at: notebook.updated_at,
    }
}

fn notebook_from_wire(wire: SyncNotebook) -> Notebook {
    Notebook {
        id: wire.id,
        title: wire.title,
        parent_folder_id: wire.parent_folder_id,
        default_native_template: wire.default_native_template,
        page_ids: Vec::new(),
        created_at: wire.created_at,
        updated_at: wire.updated_at,
    }
}

fn stroke_to_wire(stroke: &Stroke) -> SyncStroke {
    SyncStroke {
        id: stroke.id.clone(),
        size: stroke.size,
        pen: stroke.pen.name().to_string(),
        color: stroke.color,
        bounding_box: SyncBoundingBox {
            top: stroke.top,
            bottom: stroke.bottom,
            left: stroke.left,
            right: stroke.right,
        },
        points: stroke
            .points
            .iter()
            .map(|p| SyncStrokePoint {
                x: p.x,
                y: p.y,
                pressure: p.pressure,
                size: p.size,
                tilt_x: p.tilt_x,
                tilt_y: p.tilt_y,
                timestamp: p.timestamp,
            })
            .collect(),
        created_at: stroke.created_at,
        updated_at: stroke.updated_at,
    }
}

fn stroke_from_wire(wire: SyncStroke, page_id: &str) -> Result<Stroke, SyncError> {
    let pen: Pen = wire.pen.parse()?;
    Ok(Stroke {
        id: wire.id,
        page_id: page_id.to_string(),
        size: wire.size,
        pen,
        color: wire.color,
        top: wire.bounding_box.top,
        bottom: wire.bounding_box.bottom,
        left: wire.bounding_box.left,
        right: wire.bounding_box.right,
        points: wire
            .points
            .into_iter()
            .map(|p| StrokePoint {
                x: p.x,
                y: p.y,
                pressure: p.pressure,
                size: p.size,
                tilt_x: p.tilt_x,
                tilt_y: p.tilt_y,
                timestamp: p.timestamp,
            })
            .collect(),
        created_at: wire.created_at,
        updated_at: wire.updated_at,
    })
}

fn image_to_wire(local: &LocalImage) -> SyncImage {
    let image = &local.image;
    SyncImage {
        id: image.id.clone(),
        position: SyncPosition {
            x: image.x,
            y: image.y,
        },
        dimensions: SyncDimensions {
            width: image.width,
            height: image.height,
        },
        uri: image.uri.clone(),
        data: local.data.as_ref().map(|bytes| BASE64.encode(bytes)),
        mime_type: mime_type_for(image.uri.as_deref()).to_string(),
        created_at: image.created_at,
        updated_at: image.updated_at,
    }
}

fn image_from_wire(wire: SyncImage, page_id: &str) -> LocalImage {
    let data = wire.data.as_deref().and_then(|encoded| match decode_base64(encoded) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(image_id = %wire.id, error = %e, "Discarding undecodable inline image");
            None
        }
    });
    LocalImage {
        image: Image {
            id: wire.id,
            page_id: page_id.to_string(),
            x: wire.position.x,
            y: wire.position.y,
            width: wire.dimensions.width,
            height: wire.dimensions.height,
            uri: wire.uri,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        },
        data,
    }
}

/// Base64 as other clients write it, which may wrap lines
fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}

fn page_from_wire(data: SyncPageData) -> Result<RemotePage, SyncError> {
    let wire = data.page;
    let page = Page {
        id: wire.id,
        notebook_id: wire
            .notebook_id
            .or_else(|| data.notebook.as_ref().map(|nb| nb.id.clone())),
        scroll: wire.scroll,
        background: wire.background,
        background_type: wire.background_type,
        parent_folder_id: wire.parent_folder_id,
        created_at: wire.created_at,
        updated_at: wire.updated_at,
    };
    let strokes = data
        .strokes
        .into_iter()
        .map(|s| stroke_from_wire(s, &page.id))
        .collect::<Result<Vec<_>, _>>()?;
    let images = data
        .images
        .into_iter()
        .map(|i| image_from_wire(i, &page.id))
        .collect();
    let background = data
        .assets
        .background_image
        .and_then(|bg| decode_base64(&bg.data).ok());

    Ok(RemotePage {
        device_id: data.sync_format.device_id,
        notebook: data.notebook.map(notebook_from_wire),
        page,
        page_order: wire.page_order,
        strokes,
        images,
        background,
        folder_path: data.folder_path,
    })
}

fn folder_path_items(folders: &[Folder]) -> Vec<SyncFolderPathItem> {
    folders
        .iter()
        .map(|f| SyncFolderPathItem {
            id: f.id.clone(),
            title: f.title.clone(),
        })
        .collect()
}

/// Folders from the root down to `folder_id`
///
/// Walks `parent_folder_id` upward and stops at a missing folder or when a
/// folder repeats.
pub async fn resolve_folder_path(
    store: &dyn ILocalStore,
    folder_id: Option<&str>,
) -> anyhow::Result<Vec<Folder>> {
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut next = folder_id.map(str::to_string);

    while let Some(id) = next {
        if !seen.insert(id.clone()) {
            tracing::warn!(folder_id = %id, "Folder hierarchy contains a cycle");
            break;
        }
        match store.get_folder_by_id(&id).await? {
            Some(folder) => {
                next = folder.parent_folder_id.clone();
                path.push(folder);
            }
            None => break,
        }
    }

    path.reverse();
    Ok(path)
}
