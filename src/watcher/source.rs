//! Filesystem subscription primitive.
//!
//! A [`WatchSource`] turns a single path into a typed stream of
//! [`FsEvent`]s. The stream is at-least-once and may repeat events; the
//! debounced watch on top of it absorbs the noise.

use std::any::Any;
use std::path::Path;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::WatchError;

/// Raw change notification for one watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEvent {
    Modified,
    Removed,
}

impl FsEvent {
    /// Classify a notify event kind.
    ///
    /// Renames count as removals: the watched name no longer points at the
    /// subscribed inode, so the grace-period check decides what happened.
    pub fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => Some(FsEvent::Removed),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) | EventKind::Create(_) => Some(FsEvent::Modified),
            _ => None,
        }
    }
}

/// A live subscription. Dropping it releases the underlying OS watch.
pub struct Subscription {
    events: mpsc::Receiver<FsEvent>,
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    /// Wrap an event receiver together with whatever keeps it alive.
    pub fn new(events: mpsc::Receiver<FsEvent>, guard: impl Any + Send) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }

    /// Next event, or `None` once the producer side is gone.
    pub async fn recv(&mut self) -> Option<FsEvent> {
        self.events.recv().await
    }
}

/// Factory for per-path subscriptions.
pub trait WatchSource: Send + Sync {
    /// Subscribe to change notifications for `path`.
    fn subscribe(&self, path: &Path) -> Result<Subscription, WatchError>;

    /// Existence check used after a removal notification.
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// [`WatchSource`] backed by the platform's recommended notify watcher.
#[derive(Debug, Clone)]
pub struct NotifySource {
    buffer: usize,
}

impl NotifySource {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }
}

impl Default for NotifySource {
    fn default() -> Self {
        Self::new(64)
    }
}

impl WatchSource for NotifySource {
    fn subscribe(&self, path: &Path) -> Result<Subscription, WatchError> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let watched = path.to_path_buf();

        // notify calls back on its own thread, outside the runtime.
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Some(kind) = FsEvent::from_kind(&event.kind) {
                    let _ = tx.blocking_send(kind);
                }
            }
            Err(e) => {
                tracing::warn!("[watch] event error for {}: {e}", watched.display());
            }
        })?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Subscription::new(rx, watcher))
    }
}
