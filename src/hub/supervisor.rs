//! Keeps live debounced watches in step with active registry entries.
//!
//! The supervisor owns no lock of its own. The [`WatchSet`] it operates on
//! lives inside the registry state, so `ensure_watch` and `stop_watch` run
//! under the registry lock and cannot race each other for the same path.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;

use super::path_key::PathKey;
use crate::watcher::{DebouncedWatch, WatchError, WatchHandler, WatchSource, WatchTiming};

/// Generation of a watch. Callbacks carry it so that a watch replaced or
/// stopped in the meantime cannot touch the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

impl WatchId {
    #[cfg(test)]
    pub(crate) fn for_test(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

struct LiveWatch {
    id: WatchId,
    watch: DebouncedWatch,
}

/// The live watches, at most one per key.
#[derive(Default)]
pub struct WatchSet {
    live: HashMap<PathKey, LiveWatch>,
}

impl WatchSet {
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, key: &PathKey) -> bool {
        self.live.contains_key(key)
    }

    /// True if `id` is the watch currently bound to `key`.
    pub fn is_current(&self, key: &PathKey, id: WatchId) -> bool {
        self.live.get(key).is_some_and(|live| live.id == id)
    }
}

impl fmt::Debug for WatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.live.iter().map(|(key, live)| (key, live.id)))
            .finish()
    }
}

pub struct WatchSupervisor {
    source: Arc<dyn WatchSource>,
    timing: WatchTiming,
    runtime: Handle,
    next_id: AtomicU64,
}

impl WatchSupervisor {
    pub fn new(source: Arc<dyn WatchSource>, timing: WatchTiming, runtime: Handle) -> Self {
        Self {
            source,
            timing,
            runtime,
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a watch for `key` unless one is already live.
    ///
    /// `bind` builds the handler for the new watch from its id. Returns
    /// `Ok(true)` if a watch was started, `Ok(false)` if one already existed.
    pub fn ensure_watch<F>(
        &self,
        set: &mut WatchSet,
        key: &PathKey,
        path: &Path,
        bind: F,
    ) -> Result<bool, WatchError>
    where
        F: FnOnce(WatchId) -> Arc<dyn WatchHandler>,
    {
        if set.live.get(key).is_some_and(|live| !live.watch.is_closed()) {
            return Ok(false);
        }

        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let watch = DebouncedWatch::start_on(
            &self.runtime,
            path.to_path_buf(),
            Arc::clone(&self.source),
            self.timing,
            bind(id),
        )?;

        // A finished watch left under this key is replaced and dropped here
        set.live.insert(key.clone(), LiveWatch { id, watch });
        crate::debug_event!("supervisor", "watching", "{} as {id}", path.display());
        Ok(true)
    }

    /// Stop the watch for `key`, if any. Returns whether one was stopped.
    pub fn stop_watch(&self, set: &mut WatchSet, key: &PathKey) -> bool {
        match set.live.remove(key) {
            Some(live) => {
                live.watch.close();
                crate::debug_event!("supervisor", "stopped", "{}", live.watch.path().display());
                true
            }
            None => false,
        }
    }

    /// Stop every watch. Returns how many were stopped.
    pub fn stop_all(&self, set: &mut WatchSet) -> usize {
        let count = set.live.len();
        for (_, live) in set.live.drain() {
            live.watch.close();
        }
        count
    }
}

impl fmt::Debug for WatchSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSupervisor")
            .field("timing", &self.timing)
            .finish()
    }
}
