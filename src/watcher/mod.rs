//! Per-path filesystem watching with debouncing.
//!
//! # Architecture
//!
//! ```text
//! WatchSource (notify)        one per path
//!   - subscribe(path) -> Subscription (stream of FsEvent)
//!         |
//! DebouncedWatch              one task per path
//!   - Debouncer: quiet period for Modified, grace period for Removed
//!   - re-subscribes on delete-then-recreate
//!         |
//! WatchHandler                on_modify / on_delete
//! ```

mod debounced;
mod debouncer;
mod error;
mod handler;
mod source;

pub use debounced::{DebouncedWatch, WatchTiming};
pub use debouncer::{Debouncer, Due};
pub use error::WatchError;
pub use handler::WatchHandler;
pub use source::{FsEvent, NotifySource, Subscription, WatchSource};
