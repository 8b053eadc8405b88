//! Add command - registers a file, or every matching file under a directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use console::Term;
use walkdir::{DirEntry, WalkDir};

use crate::cli::client::{ServerClient, WatchOutcome};
use crate::config::Settings;
use crate::lockfile::LockFile;
use crate::paths;

/// Arguments for the add command.
pub struct AddArgs {
    pub path: String,
    pub recursive: bool,
    pub filter: Vec<String>,
    pub inactive: bool,
    pub yes: bool,
}

pub async fn run(args: AddArgs, settings: &Settings, lock: &LockFile) -> Result<()> {
    let root = paths::resolve_existing(&args.path)
        .with_context(|| format!("invalid path: {}", args.path))?;
    if !root.exists() {
        bail!("No such file or directory: {}", root.display());
    }

    let files = if root.is_dir() {
        if !args.recursive {
            bail!(
                "{} is a directory. Use -r to add the files inside it",
                root.display()
            );
        }
        let extensions = if args.filter.is_empty() {
            normalize_extensions(&settings.add.extensions)
        } else {
            normalize_extensions(&args.filter)
        };
        let files = collect_files(&root, &extensions);
        if files.is_empty() {
            println!("No matching files under {}", root.display());
            return Ok(());
        }
        if files.len() > settings.add.confirm_threshold && !args.yes && !confirm(files.len())? {
            println!("Cancelled");
            return Ok(());
        }
        files
    } else {
        vec![root]
    };

    let client = ServerClient::from_lock(lock)?;
    let mut added = 0;
    let mut skipped = 0;
    for file in &files {
        match client.watch(file, !args.inactive).await {
            Ok(WatchOutcome::Added(view)) => {
                added += 1;
                if files.len() == 1 {
                    println!("Watching {} ({})", view.name, view.path);
                }
            }
            Ok(WatchOutcome::AlreadyWatched) => skipped += 1,
            Err(e) if files.len() == 1 => return Err(e),
            Err(e) => eprintln!("Skipping {}: {e:#}", file.display()),
        }
    }

    if files.len() > 1 || skipped > 0 {
        println!("Added {added} file(s) ({skipped} already watched)");
    }
    Ok(())
}

/// Lowercase, without a leading dot, empties removed.
fn normalize_extensions(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

/// Files under `root` with one of `extensions`, skipping hidden entries.
fn collect_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|path| has_extension(path, extensions))
        .collect()
}

fn confirm(count: usize) -> Result<bool> {
    let term = Term::stderr();
    if !term.is_term() {
        bail!("{count} files matched. Re-run with --yes to add them all");
    }
    term.write_str(&format!("Add {count} files? [y/N] "))?;
    let answer = term.read_line()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
