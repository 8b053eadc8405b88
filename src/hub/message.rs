//! Wire messages pushed to viewers.
//!
//! One JSON object per push, discriminated by `type`:
//!
//! ```json
//! {"type":"files","files":[...]}
//! {"type":"update","file":{...}}
//! {"type":"removed","path":"/docs/a.md"}
//! {"type":"log","log":{"time":"...","level":"info","message":"..."}}
//! {"type":"logs","logs":[...]}
//! ```

use serde::{Deserialize, Serialize};

use super::activity::LogEntry;
use super::entry::FileView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Full file list.
    Files { files: Vec<FileView> },
    /// One entry's refreshed content.
    Update { file: FileView },
    /// One entry left the registry.
    Removed { path: String },
    /// One activity log append.
    Log { log: LogEntry },
    /// Activity log replay.
    Logs { logs: Vec<LogEntry> },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Files { .. } => "files",
            Message::Update { .. } => "update",
            Message::Removed { .. } => "removed",
            Message::Log { .. } => "log",
            Message::Logs { .. } => "logs",
        }
    }
}
