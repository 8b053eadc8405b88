//! Lock file that tells CLI commands where the running server listens.
//!
//! Lives at `~/.livemd.lock` and holds `{"port": 3000, "pid": 1234}`. A bare
//! port number is also accepted when reading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const LOCK_FILE_NAME: &str = ".livemd.lock";

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock file {path} is corrupt: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("cannot locate home directory for the lock file")]
    NoHome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub port: u16,
    pub pid: u32,
}

impl LockInfo {
    /// Lock info for this process.
    pub fn current(port: u16) -> Self {
        Self {
            port,
            pid: std::process::id(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.livemd.lock`
    pub fn default_location() -> Result<Self, LockError> {
        dirs::home_dir()
            .map(|home| Self::new(home.join(LOCK_FILE_NAME)))
            .ok_or(LockError::NoHome)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no server is recorded.
    pub fn read(&self) -> Result<Option<LockInfo>, LockError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LockError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let trimmed = content.trim();
        if let Ok(port) = trimmed.parse::<u16>() {
            return Ok(Some(LockInfo { port, pid: 0 }));
        }

        serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|e| LockError::Invalid {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    pub fn write(&self, info: LockInfo) -> Result<(), LockError> {
        let json = serde_json::to_string(&info).map_err(|e| LockError::Invalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, json).map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the lock. Returns false when there was none.
    pub fn remove(&self) -> Result<bool, LockError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
