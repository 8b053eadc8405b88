//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module. Commands other than
//! `start` talk to the running server through the lock file.

pub mod add;
pub mod list;
pub mod port;
pub mod remove;
pub mod start;
pub mod stop;
pub mod update;

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::config::Settings;

/// `--config` if given, else `~/.livemd/settings.toml`.
pub fn config_path(custom: Option<&Path>) -> Result<PathBuf> {
    match custom {
        Some(path) => Ok(path.to_path_buf()),
        None => Settings::default_config_path()
            .ok_or_else(|| anyhow!("cannot locate home directory for settings")),
    }
}

/// Load settings from `--config` or the default location, plus environment.
pub fn load_settings(custom: Option<&Path>) -> Result<Settings> {
    let loaded = match custom {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.map_err(|e| anyhow!("Configuration error: {e}"))
}
