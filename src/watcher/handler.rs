//! Callback trait bound to each debounced watch.

use std::path::Path;

/// Receives the outcome of debouncing for one watched path.
///
/// Callbacks run on the watch's own task. Implementations may take locks
/// (the registry does); the watch holds none of its own while calling.
pub trait WatchHandler: Send + Sync {
    /// The path changed and has been quiet for the debounce period.
    fn on_modify(&self, path: &Path);

    /// The path was removed and did not come back within the grace period.
    /// The watch stops after this call.
    fn on_delete(&self, path: &Path);
}
