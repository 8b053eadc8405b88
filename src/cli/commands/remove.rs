//! Remove command - stops watching a file.

use anyhow::{Context, Result};

use crate::cli::client::ServerClient;
use crate::lockfile::LockFile;
use crate::paths;

pub async fn run(path: &str, lock: &LockFile) -> Result<()> {
    let path = paths::normalize(path).with_context(|| format!("invalid path: {path}"))?;
    let client = ServerClient::from_lock(lock)?;
    client.remove(&path).await?;
    println!("Removed {}", path.display());
    Ok(())
}
