//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - TOML file (`~/.livemd/settings.toml`, or `--config <file>`)
//! - environment variables
//!
//! # Environment Variables
//!
//! Variables are prefixed with `LIVEMD_` and use double underscores to
//! separate nested levels:
//! - `LIVEMD_SERVER__PORT=4000` sets `server.port`
//! - `LIVEMD_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `LIVEMD_PATHS__CASE_INSENSITIVE=true` sets `paths.case_insensitive`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hub::CaseRule;
use crate::watcher::WatchTiming;

const ENV_PREFIX: &str = "LIVEMD_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// HTTP / WebSocket server
    #[serde(default)]
    pub server: ServerConfig,

    /// Debounce and delete-grace windows
    #[serde(default)]
    pub watch: WatchConfig,

    /// Broadcast hub sizing
    #[serde(default)]
    pub hub: HubConfig,

    /// Path identity policy
    #[serde(default)]
    pub paths: PathsConfig,

    /// Recursive `add` behaviour
    #[serde(default)]
    pub add: AddConfig,

    /// Process logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Preferred port
    #[serde(default = "default_port")]
    pub port: u16,

    /// How many successive ports to try when the preferred one is busy
    #[serde(default = "default_port_scan")]
    pub port_scan: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Quiet period before a change is re-rendered
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long a removal is held before the file is declared deleted
    #[serde(default = "default_delete_grace_ms")]
    pub delete_grace_ms: u64,

    /// Raw event buffer per subscription
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HubConfig {
    /// Outbound messages buffered per viewer before it is dropped
    #[serde(default = "default_session_queue")]
    pub session_queue: usize,

    /// Activity log entries kept for replay
    #[serde(default = "default_log_history")]
    pub log_history: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct PathsConfig {
    /// Compare paths case-insensitively. Unset means the platform default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AddConfig {
    /// Extensions picked up by `add -r` when no `--filter` is given
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Ask before adding more files than this
    #[serde(default = "default_confirm_threshold")]
    pub confirm_threshold: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides
    #[serde(default)]
    pub modules: IndexMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_port_scan() -> u16 {
    100
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_delete_grace_ms() -> u64 {
    300
}
fn default_event_buffer() -> usize {
    64
}
fn default_session_queue() -> usize {
    256
}
fn default_log_history() -> usize {
    100
}
fn default_confirm_threshold() -> usize {
    500
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_extensions() -> Vec<String> {
    [
        "md", "markdown", "go", "cs", "razor", "js", "ts", "jsx", "tsx", "html", "htm", "css",
        "json", "yaml", "yml", "toml", "py", "rb", "rs", "java", "sh", "bash", "xml", "svg",
        "txt",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
            hub: HubConfig::default(),
            paths: PathsConfig::default(),
            add: AddConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            port_scan: default_port_scan(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            delete_grace_ms: default_delete_grace_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            session_queue: default_session_queue(),
            log_history: default_log_history(),
        }
    }
}

impl Default for AddConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            confirm_threshold: default_confirm_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: IndexMap::new(),
        }
    }
}

impl WatchConfig {
    pub fn timing(&self) -> WatchTiming {
        WatchTiming {
            debounce: Duration::from_millis(self.debounce_ms),
            delete_grace: Duration::from_millis(self.delete_grace_ms),
        }
    }
}

impl PathsConfig {
    pub fn case_rule(&self) -> CaseRule {
        match self.case_insensitive {
            Some(true) => CaseRule::Insensitive,
            Some(false) => CaseRule::Sensitive,
            None => CaseRule::platform_default(),
        }
    }
}

impl Settings {
    /// Load configuration from the default location plus environment.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        match Self::default_config_path() {
            Some(path) => Self::load_from(path),
            None => Self::figment(None).extract().map_err(Box::new),
        }
    }

    /// Load configuration from a specific file plus environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(Some(path.as_ref()))
            .extract()
            .map_err(Box::new)
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// `~/.livemd/settings.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".livemd").join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.watch.debounce_ms, 100);
        assert_eq!(settings.watch.delete_grace_ms, 300);
        assert_eq!(settings.hub.log_history, 100);
        assert!(settings.add.extensions.contains(&"md".to_string()));
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[server]
port = 8888

[watch]
debounce_ms = 250
delete_grace_ms = 500

[paths]
case_insensitive = true

[logging.modules]
livemd = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.server.port, 8888);
        assert_eq!(settings.watch.timing().debounce, Duration::from_millis(250));
        assert_eq!(
            settings.watch.timing().delete_grace,
            Duration::from_millis(500)
        );
        assert_eq!(settings.paths.case_rule(), CaseRule::Insensitive);
        assert_eq!(settings.logging.modules["livemd"], "debug");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[hub]\nsession_queue = 8\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.hub.session_queue, 8);
        assert_eq!(settings.hub.log_history, 100);
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.watch, WatchConfig::default());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.server.port = 4321;
        settings.watch.debounce_ms = 50;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.server.port, 4321);
        assert_eq!(loaded.watch.debounce_ms, 50);
    }

    #[test]
    fn test_case_rule_explicit_sensitive() {
        let paths = PathsConfig {
            case_insensitive: Some(false),
        };
        assert_eq!(paths.case_rule(), CaseRule::Sensitive);
    }
}
