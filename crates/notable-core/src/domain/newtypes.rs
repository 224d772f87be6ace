//! Domain newtypes
//!
//! Strongly-typed wrappers for the device identity and the sync watermark.
//! Entity ids (notebooks, pages, strokes...) are produced by the note app and
//! travel as plain strings.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// DeviceId
// ============================================================================

/// Identity of one installation, stamped into every payload it uploads
///
/// Generated once and persisted; used on pull to skip files this device
/// wrote itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Create a new random DeviceId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a DeviceId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid device id: {e}")))
    }
}

impl From<Uuid> for DeviceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// SyncWatermark
// ============================================================================

/// Boundary between already-synced and pending changes
///
/// Stored as epoch milliseconds. Zero means this device has never completed
/// a bidirectional cycle, in which case everything counts as modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncWatermark(i64);

impl SyncWatermark {
    /// The "never synced" watermark
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis())
    }

    /// Watermark for the current wall-clock time
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 <= 0
    }

    /// The watermark as a timestamp; zero maps to the Unix epoch
    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or_default()
    }
}

impl Display for SyncWatermark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "never")
        } else {
            write!(f, "{}", self.as_datetime().to_rfc3339())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_roundtrips_through_string() {
        let id = DeviceId::new();
        let parsed: DeviceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn device_id_rejects_garbage() {
        let err = "not-a-uuid".parse::<DeviceId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn zero_watermark_is_epoch() {
        assert!(SyncWatermark::ZERO.is_zero());
        assert_eq!(SyncWatermark::ZERO.as_datetime().timestamp(), 0);
        assert_eq!(SyncWatermark::ZERO.to_string(), "never");
    }

    #[test]
    fn watermark_preserves_millis() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let wm = SyncWatermark::from_datetime(at);
        assert!(!wm.is_zero());
        assert_eq!(wm.as_datetime(), at);
        assert!(SyncWatermark::from_millis(wm.as_millis() + 1) > wm);
    }
}
