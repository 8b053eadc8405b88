//! Path normalization for paths typed at the command line.
//!
//! Handles WSL interop in both directions:
//! - `C:\Users\me\a.md` <-> `/mnt/c/Users/me/a.md`
//! - `\\wsl$\Ubuntu\home\me\a.md` / `\\wsl.localhost\Ubuntu\home\me\a.md`
//!   -> `/home/me/a.md`

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

static WSL_UNC: OnceLock<Option<Regex>> = OnceLock::new();

fn wsl_unc() -> Option<&'static Regex> {
    WSL_UNC
        .get_or_init(|| Regex::new(r"(?i)^\\\\wsl(?:\$|\.localhost)\\[^\\]+(.*)$").ok())
        .as_ref()
}

/// `X:` drive prefix, if any.
fn drive_letter(path: &str) -> Option<char> {
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => Some(letter),
        _ => None,
    }
}

/// Windows or WSL UNC path to its Linux form. Other input is returned as is.
pub fn to_linux_path(path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }

    if let Some(caps) = wsl_unc().and_then(|re| re.captures(path)) {
        let rest = caps.get(1).map_or("", |m| m.as_str());
        let rest = rest.replace('\\', "/");
        return if rest.is_empty() { "/".to_string() } else { rest };
    }

    if let Some(letter) = drive_letter(path) {
        let rest = path[2..].replace('\\', "/");
        return format!("/mnt/{}{rest}", letter.to_ascii_lowercase());
    }

    path.to_string()
}

/// `/mnt/<drive>/...` to `X:\...`. Native Linux paths become
/// `\\wsl.localhost\<distro>\...` when `distro` is known.
pub fn to_windows_path(path: &str, distro: Option<&str>) -> String {
    if drive_letter(path).is_some() {
        return path.to_string();
    }

    if let Some(rest) = path.strip_prefix("/mnt/") {
        let mut chars = rest.chars();
        if let Some(letter) = chars.next().filter(char::is_ascii_alphabetic) {
            let tail = chars.as_str();
            if tail.is_empty() || tail.starts_with('/') {
                let tail = if tail.is_empty() { "\\" } else { tail };
                return format!("{}:{}", letter.to_ascii_uppercase(), tail.replace('/', "\\"));
            }
        }
    }

    match distro {
        Some(distro) if path.starts_with('/') => {
            format!(r"\\wsl.localhost\{distro}{}", path.replace('/', "\\"))
        }
        _ => path.to_string(),
    }
}

/// Convert `path` into the form native to the running platform.
pub fn convert(path: &str) -> String {
    if cfg!(windows) {
        let distro = std::env::var("WSL_DISTRO_NAME").ok();
        to_windows_path(path, distro.as_deref())
    } else {
        to_linux_path(path)
    }
}

/// Lexically remove `.` and resolve `..` without touching the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                );
                let after_parent = matches!(out.components().next_back(), Some(Component::ParentDir));
                if at_root && out.has_root() {
                    // `/..` is `/`
                } else if at_root || after_parent {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Convert, absolutize against the working directory, and clean.
pub fn normalize(input: &str) -> std::io::Result<PathBuf> {
    let converted = convert(input);
    let absolute = std::path::absolute(Path::new(&converted))?;
    Ok(clean(&absolute))
}

/// Like [`normalize`], but falls back to the unconverted input when only
/// that one exists on disk.
pub fn resolve_existing(input: &str) -> std::io::Result<PathBuf> {
    let converted = normalize(input)?;
    if converted.exists() {
        return Ok(converted);
    }

    let original = clean(&std::path::absolute(Path::new(input))?);
    if original.exists() {
        Ok(original)
    } else {
        Ok(converted)
    }
}
