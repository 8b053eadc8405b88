//! Registry records and their wire view.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a registered path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Known, not watched.
    Registered,
    /// Watched, content current.
    Active,
    /// Vanished from disk; content frozen at the last good render.
    Deleted,
}

/// One tracked file.
#[derive(Debug, Clone)]
pub struct WatchEntry {
    path: PathBuf,
    display_name: String,
    registered_at: DateTime<Utc>,
    last_changed_at: DateTime<Utc>,
    rendered_content: String,
    state: EntryState,
}

impl WatchEntry {
    pub(super) fn new(
        path: PathBuf,
        rendered_content: String,
        modified: DateTime<Utc>,
        state: EntryState,
    ) -> Self {
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path,
            display_name,
            registered_at: Utc::now(),
            last_changed_at: modified,
            rendered_content,
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn last_changed_at(&self) -> DateTime<Utc> {
        self.last_changed_at
    }

    pub fn rendered_content(&self) -> &str {
        &self.rendered_content
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EntryState::Active
    }

    pub fn is_deleted(&self) -> bool {
        self.state == EntryState::Deleted
    }

    pub(super) fn refresh(&mut self, rendered_content: String, modified: DateTime<Utc>) {
        self.rendered_content = rendered_content;
        self.last_changed_at = modified;
    }

    pub(super) fn set_state(&mut self, state: EntryState) {
        self.state = state;
    }

    pub fn view(&self) -> FileView {
        FileView {
            path: self.path.display().to_string(),
            name: self.display_name.clone(),
            track_time: self.registered_at,
            last_change: self.last_changed_at,
            html: self.rendered_content.clone(),
            active: self.is_active(),
            deleted: self.is_deleted(),
            state: self.state,
        }
    }
}

/// Serialized form of a [`WatchEntry`] as pushed to viewers and returned
/// by the control API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub path: String,
    pub name: String,
    pub track_time: DateTime<Utc>,
    pub last_change: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub html: String,
    pub active: bool,
    pub deleted: bool,
    pub state: EntryState,
}

/// File modification time, or now when the platform cannot tell.
pub(super) fn modified_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::now()))
}
