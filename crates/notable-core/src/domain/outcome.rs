//! Result vocabulary for sync operations

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Outcome of a sync operation as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOutcome {
    Success,
    PartialSuccess,
    UpToDate,
    Error,
    Disabled,
    NotConfigured,
    PageNotFound,
    NotebookNotFound,
    UploadFailed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "SUCCESS",
            SyncOutcome::PartialSuccess => "PARTIAL_SUCCESS",
            SyncOutcome::UpToDate => "UP_TO_DATE",
            SyncOutcome::Error => "ERROR",
            SyncOutcome::Disabled => "DISABLED",
            SyncOutcome::NotConfigured => "NOT_CONFIGURED",
            SyncOutcome::PageNotFound => "PAGE_NOT_FOUND",
            SyncOutcome::NotebookNotFound => "NOTEBOOK_NOT_FOUND",
            SyncOutcome::UploadFailed => "UPLOAD_FAILED",
        }
    }

    /// SUCCESS or UP_TO_DATE: nothing left to retry
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, SyncOutcome::Success | SyncOutcome::UpToDate)
    }

    /// Fold per-item counts into one outcome
    ///
    /// Nothing attempted is UP_TO_DATE; all good is SUCCESS; a mix is
    /// PARTIAL_SUCCESS; only failures is ERROR.
    pub fn aggregate(successes: usize, failures: usize) -> Self {
        match (successes, failures) {
            (0, 0) => SyncOutcome::UpToDate,
            (_, 0) => SyncOutcome::Success,
            (0, _) => SyncOutcome::Error,
            _ => SyncOutcome::PartialSuccess,
        }
    }

    /// Combine the push and pull phases of a bidirectional cycle
    pub fn combine(push: SyncOutcome, pull: SyncOutcome) -> Self {
        use SyncOutcome::*;
        match (push, pull) {
            (UpToDate, UpToDate) => UpToDate,
            (Success | UpToDate, Success | UpToDate) => Success,
            (Error, _) | (_, Error) => Error,
            _ => PartialSuccess,
        }
    }
}

impl Display for SyncOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
