//! Stop command - asks the running server to shut down.

use anyhow::Result;

use crate::cli::client::ServerClient;
use crate::lockfile::LockFile;

pub async fn run(lock: &LockFile) -> Result<()> {
    let Some(info) = lock.read()? else {
        println!("livemd is not running");
        return Ok(());
    };

    let client = ServerClient::new(info.port);
    let outcome = client.shutdown().await;

    // A dead server leaves its lock behind; clear it either way.
    lock.remove()?;

    match outcome {
        Ok(()) => println!("livemd stopped (port {})", info.port),
        Err(e) => println!("Removed stale lock file ({e})"),
    }
    Ok(())
}
