//! List command - prints the files the server is watching.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use console::style;

use crate::cli::client::ServerClient;
use crate::hub::{EntryState, FileView};
use crate::lockfile::LockFile;

pub async fn run(lock: &LockFile) -> Result<()> {
    let client = ServerClient::from_lock(lock)?;
    let files = client.files().await?;

    if files.is_empty() {
        println!("No files are being watched");
        return Ok(());
    }

    println!("Watching {} file(s) at {}\n", files.len(), client.base_url());
    for file in &files {
        print_file(file);
    }
    Ok(())
}

fn print_file(file: &FileView) {
    let state = match file.state {
        EntryState::Active => style("watching").green(),
        EntryState::Registered => style("paused").yellow(),
        EntryState::Deleted => style("deleted").red(),
    };
    println!("{} [{state}]", style(&file.name).bold());
    println!("  {}", file.path);
    println!("  Tracking since: {}", local_time(file.track_time));
    println!("  Last change:    {}", local_time(file.last_change));
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
