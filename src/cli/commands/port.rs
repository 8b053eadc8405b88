//! Port command - shows or changes the default port.

use std::path::Path;

use anyhow::{Result, anyhow};

use super::{config_path, load_settings};
use crate::lockfile::LockFile;

pub fn run(port: Option<u16>, custom_config: Option<&Path>, lock: &LockFile) -> Result<()> {
    let mut settings = load_settings(custom_config)?;

    let Some(port) = port else {
        println!("Default port: {}", settings.server.port);
        match lock.read()? {
            Some(info) => println!("Running on:   {}", info.port),
            None => println!("Not running"),
        }
        return Ok(());
    };

    if port == 0 {
        return Err(anyhow!("port must be between 1 and 65535"));
    }

    let path = config_path(custom_config)?;
    settings.server.port = port;
    settings
        .save(&path)
        .map_err(|e| anyhow!("cannot write {}: {e}", path.display()))?;
    println!("Default port set to {port} ({})", path.display());
    if lock.read()?.is_some() {
        println!("Restart livemd for the change to take effect");
    }
    Ok(())
}
