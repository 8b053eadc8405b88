//! Update command - replaces this binary with the latest release build.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use semver::Version;
use serde::Deserialize;

const RELEASES_URL: &str = "https://api.github.com/repos/livemd/livemd/releases/latest";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

pub async fn run() -> Result<()> {
    let current = env!("CARGO_PKG_VERSION");
    println!("Checking for updates...");

    let client = reqwest::Client::builder()
        .user_agent(concat!("livemd/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(120))
        .build()?;

    let release: Release = client
        .get(RELEASES_URL)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()
        .await
        .context("cannot reach the release server")?
        .error_for_status()?
        .json()
        .await
        .context("unexpected release response")?;

    if !is_newer(current, &release.tag_name)? {
        println!("Already up to date ({current})");
        return Ok(());
    }
    println!("New version available: {} (current: {current})", release.tag_name);

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let wanted = asset_name(os, arch).ok_or_else(|| anyhow!("no release build for {os}/{arch}"))?;
    let asset = release
        .assets
        .iter()
        .find(|asset| asset.name == wanted)
        .ok_or_else(|| anyhow!("release {} has no {wanted}", release.tag_name))?;

    println!("Downloading {}...", asset.name);
    let binary = client
        .get(&asset.browser_download_url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await
        .context("download interrupted")?;
    if binary.is_empty() {
        bail!("downloaded {} is empty", asset.name);
    }

    let staged = std::env::temp_dir().join(format!("livemd-update-{}", std::process::id()));
    let replaced = stage(&staged, &binary).and_then(|()| {
        self_replace::self_replace(&staged).context("cannot replace the running binary")
    });
    let _ = std::fs::remove_file(&staged);
    replaced?;

    println!("Updated to {}", release.tag_name);
    Ok(())
}

/// True if `remote` is a strictly later release than `local`.
/// A leading `v` on either side is ignored.
pub fn is_newer(local: &str, remote: &str) -> Result<bool> {
    let parse = |raw: &str| {
        Version::parse(raw.trim().trim_start_matches('v'))
            .with_context(|| format!("cannot compare version {raw:?}"))
    };
    Ok(parse(remote)? > parse(local)?)
}

/// Release asset for a platform, e.g. `livemd-linux-amd64`.
pub fn asset_name(os: &str, arch: &str) -> Option<String> {
    let os = match os {
        "linux" => "linux",
        "macos" => "darwin",
        "windows" => "windows",
        _ => return None,
    };
    let arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        _ => return None,
    };
    let ext = if os == "windows" { ".exe" } else { "" };
    Some(format!("livemd-{os}-{arch}{ext}"))
}

fn stage(path: &Path, binary: &[u8]) -> Result<()> {
    std::fs::write(path, binary).with_context(|| format!("cannot write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer() {
        assert!(is_newer("0.4.2", "v0.5.0").unwrap());
        assert!(is_newer("v0.4.2", "0.4.10").unwrap());
        assert!(is_newer("0.9.9", "1.0.0").unwrap());
        assert!(!is_newer("0.4.2", "v0.4.2").unwrap());
        assert!(!is_newer("0.5.0", "0.4.9").unwrap());
        assert!(!is_newer("1.0.0", "1.0.0-rc.1").unwrap());
    }

    #[test]
    fn test_is_newer_rejects_garbage() {
        assert!(is_newer("0.4.2", "latest").is_err());
        assert!(is_newer("dev", "0.4.2").is_err());
    }

    #[test]
    fn test_asset_name() {
        assert_eq!(asset_name("linux", "x86_64").as_deref(), Some("livemd-linux-amd64"));
        assert_eq!(asset_name("macos", "aarch64").as_deref(), Some("livemd-darwin-arm64"));
        assert_eq!(
            asset_name("windows", "x86_64").as_deref(),
            Some("livemd-windows-amd64.exe")
        );
        assert_eq!(asset_name("freebsd", "x86_64"), None);
        assert_eq!(asset_name("linux", "riscv64"), None);
    }
}
