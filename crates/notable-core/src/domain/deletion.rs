//! Deletion tombstones

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::newtypes::DeviceId;

/// Days a synced tombstone is kept before it may be purged
pub const DELETION_RETENTION_DAYS: i64 = 30;

/// Kind of item a tombstone refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionType {
    Notebook,
    Page,
    Folder,
}

impl DeletionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionType::Notebook => "NOTEBOOK",
            DeletionType::Page => "PAGE",
            DeletionType::Folder => "FOLDER",
        }
    }
}

impl Display for DeletionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOTEBOOK" => Ok(DeletionType::Notebook),
            "PAGE" => Ok(DeletionType::Page),
            "FOLDER" => Ok(DeletionType::Folder),
            other => Err(DomainError::UnknownItemType(other.to_string())),
        }
    }
}

/// Record that an item was deleted on this device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionLogEntry {
    pub id: String,
    pub deleted_item_id: String,
    pub deleted_item_type: DeletionType,
    pub deleted_at: DateTime<Utc>,
    /// Set once the deletion reached the remote
    pub synced_at: Option<DateTime<Utc>>,
    pub device_id: DeviceId,
}

impl DeletionLogEntry {
    pub fn new(
        item_id: impl Into<String>,
        item_type: DeletionType,
        device_id: DeviceId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            deleted_item_id: item_id.into(),
            deleted_item_type: item_type,
            deleted_at: at,
            synced_at: None,
            device_id,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }

    /// Synced and older than the retention window
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.is_synced() && self.deleted_at < now - retention
    }
}
