pub mod logging;

pub mod cli;
pub mod config;
pub mod hub;
pub mod lockfile;
pub mod paths;
pub mod render;
pub mod server;
pub mod watcher;

pub use config::Settings;
pub use hub::{BroadcastHub, CaseRule, FileRegistry, FileView, HubError, Message, RegistryOptions};
pub use lockfile::{LockFile, LockInfo};
pub use render::{HtmlRenderer, RenderError, Renderer};
pub use server::Server;
pub use watcher::{DebouncedWatch, NotifySource, WatchError, WatchSource, WatchTiming};
