//! Error types for the watcher subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from filesystem subscription and watch lifecycle.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("No async runtime available to drive the watch")]
    NoRuntime,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
