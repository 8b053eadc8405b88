//! Debounced watch over a single path.
//!
//! Each watch owns one [`Subscription`] and one task. The task feeds raw
//! events into a [`Debouncer`] and calls the bound [`WatchHandler`] when
//! something is due:
//!
//! ```text
//! Subscription --FsEvent--> Debouncer --Due--> WatchHandler
//!                              |
//!                   CheckRemoval: exists? --yes--> resubscribe + Modified
//!                                         --no---> on_delete, stop
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::debouncer::{Debouncer, Due};
use super::error::WatchError;
use super::handler::WatchHandler;
use super::source::{FsEvent, Subscription, WatchSource};

/// Time windows for a debounced watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    /// Quiet period after the last modification before the change fires.
    pub debounce: Duration,
    /// How long a removal is held before the existence re-check.
    pub delete_grace: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            delete_grace: Duration::from_millis(300),
        }
    }
}

/// Handle to a running debounced watch.
///
/// Closing (or dropping) the handle cancels the task. A cancelled watch
/// never calls its handler again; a callback already executing is not
/// interrupted, so handlers that care must validate their own binding.
pub struct DebouncedWatch {
    path: PathBuf,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DebouncedWatch {
    /// Subscribe to `path` and start the watch on the current runtime.
    pub fn start(
        path: PathBuf,
        source: Arc<dyn WatchSource>,
        timing: WatchTiming,
        handler: Arc<dyn WatchHandler>,
    ) -> Result<Self, WatchError> {
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        Self::start_on(&runtime, path, source, timing, handler)
    }

    /// Subscribe to `path` and start the watch on `runtime`.
    ///
    /// Subscription failures are returned here, before any task exists.
    pub fn start_on(
        runtime: &Handle,
        path: PathBuf,
        source: Arc<dyn WatchSource>,
        timing: WatchTiming,
        handler: Arc<dyn WatchHandler>,
    ) -> Result<Self, WatchError> {
        let subscription = source.subscribe(&path)?;
        let cancel = CancellationToken::new();

        let watch_loop = WatchLoop {
            path: path.clone(),
            source,
            handler,
            subscription,
            stream_open: true,
            debouncer: Debouncer::new(timing.debounce, timing.delete_grace),
            cancel: cancel.clone(),
        };
        let task = runtime.spawn(watch_loop.run());

        crate::debug_event!("watch", "started", "{}", path.display());
        Ok(Self { path, cancel, task })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cancel the watch. Safe to call repeatedly and from any task.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            crate::debug_event!("watch", "closed", "{}", self.path.display());
        }
    }

    /// True once the watch was closed or its task has ended on its own.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }
}

impl Drop for DebouncedWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for DebouncedWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedWatch")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct WatchLoop {
    path: PathBuf,
    source: Arc<dyn WatchSource>,
    handler: Arc<dyn WatchHandler>,
    subscription: Subscription,
    /// False once the subscription's producer went away.
    stream_open: bool,
    debouncer: Debouncer,
    cancel: CancellationToken,
}

impl WatchLoop {
    async fn run(mut self) {
        loop {
            let deadline = self
                .debouncer
                .next_deadline()
                .map(tokio::time::Instant::from_std);
            let sleep = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now));

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                event = self.subscription.recv(), if self.stream_open => {
                    self.on_event(event);
                }

                _ = sleep, if deadline.is_some() => {
                    if !self.on_deadline() {
                        break;
                    }
                }
            }
        }

        crate::debug_event!("watch", "loop ended", "{}", self.path.display());
    }

    fn on_event(&mut self, event: Option<FsEvent>) {
        match event {
            Some(event) => {
                tracing::trace!("[watch] {event:?} {}", self.path.display());
                self.debouncer.record(event, Instant::now());
            }
            None => {
                self.stream_open = false;
                if self.source.exists(&self.path) {
                    tracing::warn!(
                        "[watch] event stream ended for {}; no further changes will be seen",
                        self.path.display()
                    );
                } else {
                    self.debouncer.record(FsEvent::Removed, Instant::now());
                }
            }
        }
    }

    /// Handle an elapsed deadline. Returns false when the watch is done.
    fn on_deadline(&mut self) -> bool {
        let now = Instant::now();
        match self.debouncer.take_ready(now) {
            Some(Due::Fire) => {
                if self.cancel.is_cancelled() {
                    return false;
                }
                self.handler.on_modify(&self.path);
                true
            }
            Some(Due::CheckRemoval) => {
                if !self.source.exists(&self.path) {
                    self.fire_delete();
                    return false;
                }

                // Delete-then-recreate: the old subscription points at the
                // vanished inode, so bind to the new file.
                match self.source.subscribe(&self.path) {
                    Ok(subscription) => {
                        self.subscription = subscription;
                        self.stream_open = true;
                        self.debouncer.record(FsEvent::Modified, now);
                        crate::debug_event!("watch", "recreated", "{}", self.path.display());
                        true
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[watch] cannot resubscribe {}: {e}",
                            self.path.display()
                        );
                        self.fire_delete();
                        false
                    }
                }
            }
            None => true,
        }
    }

    fn fire_delete(&self) {
        if !self.cancel.is_cancelled() {
            self.handler.on_delete(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    #[derive(Default)]
    struct ScriptedSource {
        senders: Mutex<Vec<mpsc::Sender<FsEvent>>>,
        subscribes: AtomicUsize,
        fail: bool,
    }

    impl ScriptedSource {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn emit(&self, event: FsEvent) {
            if let Some(tx) = self.senders.lock().last() {
                tx.try_send(event).unwrap();
            }
        }
    }

    impl WatchSource for ScriptedSource {
        fn subscribe(&self, path: &Path) -> Result<Subscription, WatchError> {
            if self.fail {
                return Err(WatchError::PathWatchFailed {
                    path: path.to_path_buf(),
                    reason: "permission denied".to_string(),
                });
            }
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(32);
            self.senders.lock().push(tx);
            Ok(Subscription::new(rx, ()))
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        modified: AtomicUsize,
        deleted: AtomicUsize,
    }

    impl WatchHandler for CountingHandler {
        fn on_modify(&self, _path: &Path) {
            self.modified.fetch_add(1, Ordering::SeqCst);
        }

        fn on_delete(&self, _path: &Path) {
            self.deleted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn timing() -> WatchTiming {
        WatchTiming {
            debounce: Duration::from_millis(30),
            delete_grace: Duration::from_millis(120),
        }
    }

    fn fixture() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# notes").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_burst_fires_single_change() {
        let (_dir, path) = fixture();
        let source = Arc::new(ScriptedSource::default());
        let handler = Arc::new(CountingHandler::default());

        let _watch =
            DebouncedWatch::start(path, source.clone(), timing(), handler.clone()).unwrap();

        for _ in 0..5 {
            source.emit(FsEvent::Modified);
            sleep(Duration::from_millis(5)).await;
        }
        sleep(Duration::from_millis(200)).await;

        assert_eq!(handler.modified.load(Ordering::SeqCst), 1);
        assert_eq!(handler.deleted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_without_recreate_fires_delete() {
        let (_dir, path) = fixture();
        let source = Arc::new(ScriptedSource::default());
        let handler = Arc::new(CountingHandler::default());

        let watch =
            DebouncedWatch::start(path.clone(), source.clone(), timing(), handler.clone())
                .unwrap();

        std::fs::remove_file(&path).unwrap();
        source.emit(FsEvent::Removed);
        sleep(Duration::from_millis(300)).await;

        assert_eq!(handler.deleted.load(Ordering::SeqCst), 1);
        assert_eq!(handler.modified.load(Ordering::SeqCst), 0);
        assert!(watch.is_closed());
    }

    #[tokio::test]
    async fn test_delete_then_recreate_is_a_change() {
        let (_dir, path) = fixture();
        let source = Arc::new(ScriptedSource::default());
        let handler = Arc::new(CountingHandler::default());

        let watch =
            DebouncedWatch::start(path.clone(), source.clone(), timing(), handler.clone())
                .unwrap();

        // Atomic save: unlink, then write the new content
        std::fs::remove_file(&path).unwrap();
        source.emit(FsEvent::Removed);
        sleep(Duration::from_millis(20)).await;
        std::fs::write(&path, "# notes v2").unwrap();
        source.emit(FsEvent::Modified);

        sleep(Duration::from_millis(350)).await;

        assert_eq!(handler.deleted.load(Ordering::SeqCst), 0);
        assert_eq!(handler.modified.load(Ordering::SeqCst), 1);
        assert_eq!(source.subscribes.load(Ordering::SeqCst), 2);
        assert!(!watch.is_closed());
    }

    #[tokio::test]
    async fn test_close_cancels_pending_fire() {
        let (_dir, path) = fixture();
        let source = Arc::new(ScriptedSource::default());
        let handler = Arc::new(CountingHandler::default());

        let watch =
            DebouncedWatch::start(path, source.clone(), timing(), handler.clone()).unwrap();

        source.emit(FsEvent::Modified);
        sleep(Duration::from_millis(5)).await;
        watch.close();
        watch.close();
        sleep(Duration::from_millis(150)).await;

        assert_eq!(handler.modified.load(Ordering::SeqCst), 0);
        assert!(watch.is_closed());
    }

    #[tokio::test]
    async fn test_start_propagates_subscribe_error() {
        let (_dir, path) = fixture();
        let source = Arc::new(ScriptedSource::failing());
        let handler = Arc::new(CountingHandler::default());

        let result = DebouncedWatch::start(path, source, timing(), handler);
        assert!(matches!(result, Err(WatchError::PathWatchFailed { .. })));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (_dir, path) = fixture();
        let source = Arc::new(ScriptedSource::default());
        let handler = Arc::new(CountingHandler::default());

        let result = DebouncedWatch::start(path, source, timing(), handler);
        assert!(matches!(result, Err(WatchError::NoRuntime)));
    }
}
