//! The watch hub: registry, watch supervision and viewer fan-out.
//!
//! ```text
//! control API ──> FileRegistry ──(one lock)──> entries + WatchSet
//!                    │    ▲                         │
//!                    │    └── WatchBinding <── DebouncedWatch (per active path)
//!                    ▼
//!               HubHandle ──requests──> BroadcastHub task ──> Session queues
//! ```
//!
//! [`FileRegistry`] is the only type callers need; it owns the supervisor,
//! the activity log and the broadcast hub handle.

mod activity;
mod broadcast;
mod entry;
mod error;
mod message;
mod path_key;
mod registry;
mod supervisor;

pub use activity::{ActivityLog, Level, LogEntry};
pub use broadcast::{BroadcastHub, HubHandle, Payload, Session, SessionId};
pub use entry::{EntryState, FileView, WatchEntry};
pub use error::HubError;
pub use message::Message;
pub use path_key::{CaseRule, PathKey};
pub use registry::{FileRegistry, RegistryOptions};
pub use supervisor::{WatchId, WatchSet, WatchSupervisor};
