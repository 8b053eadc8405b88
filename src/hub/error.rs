//! Error types for the watch hub.

use std::path::PathBuf;
use thiserror::Error;

use crate::render::RenderError;
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("not registered: {path}")]
    NotRegistered { path: PathBuf },

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("watch failed: {0}")]
    Watch(#[from] WatchError),

    #[error("hub is shut down")]
    ShutDown,
}

impl HubError {
    /// Caller mistakes (duplicate or unknown path) as opposed to I/O failures.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            HubError::AlreadyRegistered { .. } | HubError::NotRegistered { .. }
        )
    }
}
