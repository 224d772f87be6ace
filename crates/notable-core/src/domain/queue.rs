//! Durable outbound/inbound operation queue entries
//!
//! A [`SyncQueueEntry`] records one operation that could not complete during
//! a sync pass. Entries are retried on a fixed backoff ladder and go dormant
//! once they exhaust their retries.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Default number of attempts before an entry goes dormant
pub const DEFAULT_MAX_RETRIES: u32 = 5;

// ============================================================================
// Operation kinds
// ============================================================================

/// Kind of queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    UploadPage,
    UploadNotebook,
    UploadStandalonePage,
    UploadImage,
    DownloadPage,
    DownloadImage,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::UploadPage => "UPLOAD_PAGE",
            SyncOperation::UploadNotebook => "UPLOAD_NOTEBOOK",
            SyncOperation::UploadStandalonePage => "UPLOAD_STANDALONE_PAGE",
            SyncOperation::UploadImage => "UPLOAD_IMAGE",
            SyncOperation::DownloadPage => "DOWNLOAD_PAGE",
            SyncOperation::DownloadImage => "DOWNLOAD_IMAGE",
        }
    }

    /// Target type implied by the operation
    pub fn target_type(&self) -> SyncTargetType {
        match self {
            SyncOperation::UploadPage | SyncOperation::DownloadPage => SyncTargetType::Page,
            SyncOperation::UploadNotebook => SyncTargetType::Notebook,
            SyncOperation::UploadStandalonePage => SyncTargetType::StandalonePage,
            SyncOperation::UploadImage | SyncOperation::DownloadImage => SyncTargetType::Image,
        }
    }
}

impl Display for SyncOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOAD_PAGE" => Ok(SyncOperation::UploadPage),
            "UPLOAD_NOTEBOOK" => Ok(SyncOperation::UploadNotebook),
            "UPLOAD_STANDALONE_PAGE" => Ok(SyncOperation::UploadStandalonePage),
            "UPLOAD_IMAGE" => Ok(SyncOperation::UploadImage),
            "DOWNLOAD_PAGE" => Ok(SyncOperation::DownloadPage),
            "DOWNLOAD_IMAGE" => Ok(SyncOperation::DownloadImage),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}

/// Kind of entity a queue entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncTargetType {
    Page,
    Notebook,
    StandalonePage,
    Image,
}

impl SyncTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTargetType::Page => "PAGE",
            SyncTargetType::Notebook => "NOTEBOOK",
            SyncTargetType::StandalonePage => "STANDALONE_PAGE",
            SyncTargetType::Image => "IMAGE",
        }
    }
}

impl Display for SyncTargetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTargetType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAGE" => Ok(SyncTargetType::Page),
            "NOTEBOOK" => Ok(SyncTargetType::Notebook),
            "STANDALONE_PAGE" => Ok(SyncTargetType::StandalonePage),
            "IMAGE" => Ok(SyncTargetType::Image),
            other => Err(DomainError::UnknownItemType(other.to_string())),
        }
    }
}

// ============================================================================
// Backoff ladder
// ============================================================================

/// Delay before the next attempt after `retry_count` failures
///
/// 1 → 1 min, 2 → 5 min, 3 → 15 min, 4 → 30 min, 5 and beyond → 60 min.
/// A count of zero means "not yet failed" and retries immediately.
pub fn backoff_delay(retry_count: u32) -> Duration {
    let minutes = match retry_count {
        0 => 0,
        1 => 1,
        2 => 5,
        3 => 15,
        4 => 30,
        _ => 60,
    };
    Duration::minutes(minutes)
}

// ============================================================================
// SyncQueueEntry
// ============================================================================

/// A pending operation with its retry bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: String,
    pub operation: SyncOperation,
    pub target_id: String,
    pub target_type: SyncTargetType,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Serialized content or a locator the operation needs to replay
    pub payload: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// `None` once the entry is dormant
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl SyncQueueEntry {
    /// New entry, ready to run immediately
    pub fn new(
        operation: SyncOperation,
        target_id: impl Into<String>,
        payload: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let target_id = target_id.into();
        Self {
            id: format!("{}_{}_{}", operation.as_str(), target_id, now.timestamp_millis()),
            operation,
            target_type: operation.target_type(),
            target_id,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            payload,
            error_message: None,
            created_at: now,
            last_attempt_at: None,
            next_retry_at: Some(now),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Apply one failed attempt at `now`
    ///
    /// The next attempt is scheduled on the backoff ladder; once the count
    /// reaches `max_retries` the entry is left dormant.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_attempt_at = Some(now);
        self.error_message = Some(error.into());
        self.next_retry_at = if self.retry_count >= self.max_retries {
            None
        } else {
            Some(now + backoff_delay(self.retry_count))
        };
    }

    /// Put a dormant entry back into rotation
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.retry_count = 0;
        self.error_message = None;
        self.next_retry_at = Some(now);
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        !self.is_exhausted() && self.next_retry_at.is_some_and(|at| at <= now)
    }
}

/// Snapshot of the queue for status displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Entries that will still be retried
    pub pending: u64,
    /// Entries that exhausted their retries
    pub failed: u64,
    pub total: u64,
}

impl QueueStatus {
    pub fn has_items(&self) -> bool {
        self.total > 0
    }

    pub fn has_pending_items(&self) -> bool {
        self.pending > 0
    }

    pub fn has_failed_items(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn ladder_values() {
        assert_eq!(backoff_delay(0), Duration::zero());
        assert_eq!(backoff_delay(1), Duration::minutes(1));
        assert_eq!(backoff_delay(2), Duration::minutes(5));
        assert_eq!(backoff_delay(3), Duration::minutes(15));
        assert_eq!(backoff_delay(4), Duration::minutes(30));
        assert_eq!(backoff_delay(5), Duration::minutes(60));
        assert_eq!(backoff_delay(42), Duration::minutes(60));
    }

    #[test]
    fn new_entry_is_ready_now() {
        let entry = SyncQueueEntry::new(SyncOperation::UploadPage, "p-1", None, t0());
        assert_eq!(entry.id, format!("UPLOAD_PAGE_p-1_{}", t0().timestamp_millis()));
        assert_eq!(entry.target_type, SyncTargetType::Page);
        assert_eq!(entry.max_retries, DEFAULT_MAX_RETRIES);
        assert!(entry.is_ready(t0()));
    }

    #[test]
    fn failures_follow_the_ladder_from_last_attempt() {
        // maxRetries above five so the 60 minute rung is observable.
        let mut entry =
            SyncQueueEntry::new(SyncOperation::UploadPage, "p-1", None, t0()).with_max_retries(6);
        let expected = [1, 5, 15, 30, 60];
        let mut now = t0();
        for minutes in expected {
            entry.record_failure("boom", now);
            let next = entry.next_retry_at.unwrap();
            assert_eq!(next - entry.last_attempt_at.unwrap(), Duration::minutes(minutes));
            now = next;
        }
        assert_eq!(entry.retry_count, 5);
    }

    #[test]
    fn last_allowed_failure_makes_entry_dormant() {
        let mut entry = SyncQueueEntry::new(SyncOperation::UploadNotebook, "nb", None, t0());
        for _ in 0..DEFAULT_MAX_RETRIES - 1 {
            entry.record_failure("offline", t0());
            assert!(entry.next_retry_at.is_some());
        }
        entry.record_failure("offline", t0());
        assert_eq!(entry.retry_count, DEFAULT_MAX_RETRIES);
        assert!(entry.next_retry_at.is_none());
        assert!(entry.is_exhausted());
        assert!(!entry.is_ready(t0() + Duration::days(365)));
    }

    #[test]
    fn reset_revives_dormant_entry() {
        let mut entry = SyncQueueEntry::new(SyncOperation::UploadImage, "img", None, t0());
        for _ in 0..DEFAULT_MAX_RETRIES {
            entry.record_failure("offline", t0());
        }
        entry.reset(t0());
        assert_eq!(entry.retry_count, 0);
        assert!(entry.is_ready(t0()));
    }

    #[test]
    fn operation_names_roundtrip() {
        for op in [
            SyncOperation::UploadPage,
            SyncOperation::UploadNotebook,
            SyncOperation::UploadStandalonePage,
            SyncOperation::UploadImage,
            SyncOperation::DownloadPage,
            SyncOperation::DownloadImage,
        ] {
            assert_eq!(op.as_str().parse::<SyncOperation>().unwrap(), op);
        }
        assert!("SYNC_EVERYTHING".parse::<SyncOperation>().is_err());
    }

    #[test]
    fn queue_status_flags() {
        let status = QueueStatus {
            pending: 0,
            failed: 2,
            total: 2,
        };
        assert!(status.has_items());
        assert!(!status.has_pending_items());
        assert!(status.has_failed_items());
    }
}
