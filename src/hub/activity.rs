//! Viewer-facing activity log.
//!
//! A bounded ring of recent events. Every append is pushed to connected
//! viewers as a `log` message and mirrored into `tracing`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::broadcast::HubHandle;
use super::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub message: String,
}

pub struct ActivityLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    hub: HubHandle,
}

impl ActivityLog {
    pub fn new(capacity: usize, hub: HubHandle) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            hub,
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(Level::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.append(Level::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(Level::Error, message.into());
    }

    fn append(&self, level: Level, message: String) {
        match level {
            Level::Info => tracing::info!("[activity] {message}"),
            Level::Warn => tracing::warn!("[activity] {message}"),
            Level::Error => tracing::error!("[activity] {message}"),
        }

        let entry = LogEntry {
            time: Utc::now(),
            level,
            message,
        };

        // Published under the lock: each entry reaches a joining viewer
        // exactly once, in its replay or as a live append.
        let mut entries = self.entries.lock();
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        self.hub.publish(&Message::Log { log: entry });
    }

    /// Copy of the retained history, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Run `f` against the history while holding the log lock.
    pub fn with_history<R>(&self, f: impl FnOnce(&VecDeque<LogEntry>) -> R) -> R {
        let entries = self.entries.lock();
        f(&entries)
    }
}

impl std::fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLog")
            .field("len", &self.entries.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
