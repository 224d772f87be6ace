//! Rolling log of recent sync activity shown to the user

use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Entries kept before the oldest is dropped
pub const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl SyncLogEntry {
    /// `HH:MM:SS [LEVEL] message` in local time
    pub fn formatted(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Bounded, newest-first event log
///
/// Every entry is mirrored to `tracing` at the matching level.
#[derive(Debug)]
pub struct SyncLog {
    entries: Mutex<VecDeque<SyncLogEntry>>,
    capacity: usize,
}

impl Default for SyncLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(target: "notable_sync::log", "{message}"),
            LogLevel::Info => tracing::info!(target: "notable_sync::log", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "notable_sync::log", "{message}"),
            LogLevel::Error => tracing::error!(target: "notable_sync::log", "{message}"),
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_front(SyncLogEntry {
            timestamp: Utc::now(),
            level,
            message,
        });
        entries.truncate(self.capacity);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Snapshot, newest first
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn formatted(&self) -> Vec<String> {
        self.entries().iter().map(SyncLogEntry::formatted).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
