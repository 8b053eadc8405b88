//! The authoritative map of watched files.
//!
//! All state sits behind one lock: entries, the live watch set, and the
//! closed flag. Every public operation holds it for its whole critical
//! section, including the render call, and publishes its delta to the
//! broadcast hub before releasing it. Deltas therefore reach viewers in
//! the order the mutations happened.
//!
//! Lock order is registry state, then activity log. Nothing acquires them
//! the other way round.

use std::path::Path;
use std::sync::{Arc, Weak};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::activity::{ActivityLog, LogEntry};
use super::broadcast::{BroadcastHub, HubHandle, Session, SessionId};
use super::entry::{EntryState, FileView, WatchEntry, modified_time};
use super::error::HubError;
use super::message::Message;
use super::path_key::{CaseRule, PathKey};
use super::supervisor::{WatchId, WatchSet, WatchSupervisor};
use crate::config::Settings;
use crate::render::Renderer;
use crate::watcher::{WatchError, WatchHandler, WatchSource, WatchTiming};

/// Knobs for a [`FileRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    pub timing: WatchTiming,
    pub case_rule: CaseRule,
    pub session_queue: usize,
    pub log_history: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            timing: WatchTiming::default(),
            case_rule: CaseRule::platform_default(),
            session_queue: 256,
            log_history: 100,
        }
    }
}

impl From<&Settings> for RegistryOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            timing: settings.watch.timing(),
            case_rule: settings.paths.case_rule(),
            session_queue: settings.hub.session_queue,
            log_history: settings.hub.log_history,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: IndexMap<PathKey, WatchEntry>,
    watches: WatchSet,
    closed: bool,
}

struct RegistryCore {
    state: Mutex<RegistryState>,
    renderer: Arc<dyn Renderer>,
    supervisor: WatchSupervisor,
    hub: HubHandle,
    activity: ActivityLog,
    case_rule: CaseRule,
}

/// Shared handle to the registry. Cheap to clone.
#[derive(Clone)]
pub struct FileRegistry {
    core: Arc<RegistryCore>,
}

impl FileRegistry {
    /// Build a registry on the current tokio runtime.
    pub fn new(
        options: RegistryOptions,
        renderer: Arc<dyn Renderer>,
        source: Arc<dyn WatchSource>,
    ) -> Result<Self, HubError> {
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, options, renderer, source))
    }

    pub fn with_runtime(
        runtime: Handle,
        options: RegistryOptions,
        renderer: Arc<dyn Renderer>,
        source: Arc<dyn WatchSource>,
    ) -> Self {
        let hub = BroadcastHub::spawn(&runtime, options.session_queue);
        let activity = ActivityLog::new(options.log_history, hub.clone());
        let supervisor = WatchSupervisor::new(source, options.timing, runtime);

        Self {
            core: Arc::new(RegistryCore {
                state: Mutex::new(RegistryState::default()),
                renderer,
                supervisor,
                hub,
                activity,
                case_rule: options.case_rule,
            }),
        }
    }

    pub fn case_rule(&self) -> CaseRule {
        self.core.case_rule
    }

    /// The viewer-facing activity log.
    pub fn activity(&self) -> &ActivityLog {
        &self.core.activity
    }

    /// Add `path` and return the stored entry's view. The file is read
    /// and rendered before anything is stored; on any failure no entry
    /// exists afterwards.
    pub fn register(&self, path: &Path, activate: bool) -> Result<FileView, HubError> {
        let key = self.core.case_rule.key(path);
        let mut guard = self.core.state.lock();
        let state = &mut *guard;

        if state.closed {
            return Err(HubError::ShutDown);
        }
        if let Some(existing) = state.entries.get(&key) {
            return Err(HubError::AlreadyRegistered {
                name: existing.display_name().to_string(),
            });
        }

        let prepared = self.core.prepare(path).and_then(|(html, modified)| {
            if activate {
                self.ensure_watch(&mut state.watches, &key, path)?;
            }
            Ok((html, modified))
        });
        let (html, modified) = self.core.report(path, prepared)?;

        let initial = if activate {
            EntryState::Active
        } else {
            EntryState::Registered
        };
        let entry = WatchEntry::new(path.to_path_buf(), html, modified, initial);
        let name = entry.display_name().to_string();
        let view = entry.view();
        state.entries.insert(key, entry);

        self.core.publish_files(&state.entries);
        if activate {
            self.core.activity.info(format!("Started watching: {name}"));
        } else {
            self.core.activity.info(format!("Registered: {name}"));
        }
        Ok(view)
    }

    /// Start watching a registered path. Already active is a no-op.
    ///
    /// Content is re-rendered first; if that or the subscription fails the
    /// entry keeps its previous state. A `Deleted` entry whose file is back
    /// on disk becomes `Active` again.
    pub fn activate(&self, path: &Path) -> Result<(), HubError> {
        let key = self.core.case_rule.key(path);
        let mut guard = self.core.state.lock();
        let state = &mut *guard;

        if state.closed {
            return Err(HubError::ShutDown);
        }
        let entry = state
            .entries
            .get(&key)
            .ok_or_else(|| HubError::NotRegistered {
                path: path.to_path_buf(),
            })?;
        if entry.is_active() {
            return Ok(());
        }
        let stored = entry.path().to_path_buf();

        let prepared = self.core.prepare(&stored).and_then(|refreshed| {
            self.ensure_watch(&mut state.watches, &key, &stored)?;
            Ok(refreshed)
        });
        let (html, modified) = self.core.report(&stored, prepared)?;

        let Some(entry) = state.entries.get_mut(&key) else {
            return Ok(());
        };
        entry.refresh(html, modified);
        entry.set_state(EntryState::Active);
        let name = entry.display_name().to_string();

        self.core.publish_files(&state.entries);
        self.core
            .activity
            .info(format!("Activated watching: {name}"));
        Ok(())
    }

    /// Stop watching a path but keep it registered. Non-active entries,
    /// including deleted ones, are left as they are.
    pub fn deactivate(&self, path: &Path) -> Result<(), HubError> {
        let key = self.core.case_rule.key(path);
        let mut guard = self.core.state.lock();
        let state = &mut *guard;

        let entry = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| HubError::NotRegistered {
                path: path.to_path_buf(),
            })?;
        if !entry.is_active() {
            return Ok(());
        }

        entry.set_state(EntryState::Registered);
        let name = entry.display_name().to_string();
        self.core.supervisor.stop_watch(&mut state.watches, &key);

        self.core.publish_files(&state.entries);
        self.core
            .activity
            .info(format!("Deactivated watching: {name}"));
        Ok(())
    }

    /// Forget a path entirely.
    pub fn remove(&self, path: &Path) -> Result<(), HubError> {
        let key = self.core.case_rule.key(path);
        let mut guard = self.core.state.lock();
        let state = &mut *guard;

        let entry = state
            .entries
            .shift_remove(&key)
            .ok_or_else(|| HubError::NotRegistered {
                path: path.to_path_buf(),
            })?;
        self.core.supervisor.stop_watch(&mut state.watches, &key);

        self.core.hub.publish(&Message::Removed {
            path: entry.path().display().to_string(),
        });
        self.core
            .activity
            .info(format!("Stopped watching: {}", entry.display_name()));
        Ok(())
    }

    /// Drop every `Deleted` entry. Returns how many went.
    pub fn remove_all_deleted(&self) -> usize {
        let mut guard = self.core.state.lock();
        let state = &mut *guard;

        let deleted: Vec<PathKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_deleted())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &deleted {
            self.core.supervisor.stop_watch(&mut state.watches, key);
            state.entries.shift_remove(key);
        }

        let count = deleted.len();
        if count > 0 {
            self.core.publish_files(&state.entries);
            self.core
                .activity
                .info(format!("Removed {count} deleted file(s)"));
        }
        count
    }

    /// Point-in-time copy of all entries, in registration order.
    pub fn snapshot(&self) -> Vec<WatchEntry> {
        self.core.state.lock().entries.values().cloned().collect()
    }

    /// Wire view of [`FileRegistry::snapshot`].
    pub fn files(&self) -> Vec<FileView> {
        file_views(&self.core.state.lock().entries)
    }

    pub fn get(&self, path: &Path) -> Option<WatchEntry> {
        let key = self.core.case_rule.key(path);
        self.core.state.lock().entries.get(&key).cloned()
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.core.state.lock().watches.len()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.core.activity.entries()
    }

    /// Connect a viewer.
    ///
    /// The file list and log replay are taken and the join is queued while
    /// both locks are held, so the viewer sees every later delta and none
    /// from before its snapshot. Its own "Browser connected" entry is part
    /// of that replay, not live traffic.
    pub fn join_session(&self) -> Session {
        let state = self.core.state.lock();
        self.core.activity.info("Browser connected");

        let files = Message::Files {
            files: file_views(&state.entries),
        };
        self.core.activity.with_history(|history| {
            let logs = Message::Logs {
                logs: history.iter().cloned().collect(),
            };
            self.core.hub.join(&[files, logs])
        })
    }

    /// Disconnect a viewer. Idempotent.
    pub fn leave_session(&self, id: SessionId) {
        self.core.hub.leave(id);
        self.core.activity.info("Browser disconnected");
    }

    /// Number of connected viewers.
    pub async fn session_count(&self) -> usize {
        self.core.hub.session_count().await
    }

    /// Close every watch and every viewer session. Idempotent.
    pub fn shutdown(&self) {
        let closed = {
            let mut state = self.core.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let state = &mut *state;
            self.core.supervisor.stop_all(&mut state.watches)
        };

        self.core.hub.shutdown();
        crate::log_event!("registry", "shut down", "{closed} watches closed");
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.state.lock().closed
    }

    fn ensure_watch(
        &self,
        watches: &mut WatchSet,
        key: &PathKey,
        path: &Path,
    ) -> Result<(), HubError> {
        let core = Arc::downgrade(&self.core);
        self.core.supervisor.ensure_watch(watches, key, path, |id| {
            Arc::new(WatchBinding {
                core,
                key: key.clone(),
                id,
            })
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("FileRegistry")
            .field("entries", &state.entries.len())
            .field("watches", &state.watches)
            .field("closed", &state.closed)
            .finish()
    }
}

impl RegistryCore {
    /// Stat and render `path`.
    fn prepare(&self, path: &Path) -> Result<(String, chrono::DateTime<Utc>), HubError> {
        let metadata = std::fs::metadata(path).map_err(|source| HubError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let html = self.renderer.render(path)?;
        Ok((html, modified_time(&metadata)))
    }

    /// Log I/O failures to the activity log; input errors go back untouched.
    fn report<T>(&self, path: &Path, result: Result<T, HubError>) -> Result<T, HubError> {
        if let Err(e) = &result
            && !e.is_input_error()
        {
            self.activity
                .error(format!("Cannot watch {}: {e}", display_name(path)));
        }
        result
    }

    fn publish_files(&self, entries: &IndexMap<PathKey, WatchEntry>) {
        self.hub.publish(&Message::Files {
            files: file_views(entries),
        });
    }

    fn on_file_changed(&self, key: &PathKey, id: WatchId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.watches.is_current(key, id) {
            crate::debug_event!("registry", "stale change", "{key} from {id}");
            return;
        }
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };

        let path = entry.path().to_path_buf();
        match self.renderer.render(&path) {
            Ok(html) => {
                let modified = std::fs::metadata(&path)
                    .map(|metadata| modified_time(&metadata))
                    .unwrap_or_else(|_| Utc::now());
                // Deleted entries have no current watch; only activate
                // brings them back.
                entry.refresh(html, modified);

                self.hub.publish(&Message::Update { file: entry.view() });
                self.activity
                    .info(format!("File changed: {}", entry.display_name()));
            }
            Err(e) => {
                self.activity
                    .error(format!("Error rendering {}: {e}", entry.display_name()));
            }
        }
    }

    fn on_file_deleted(&self, key: &PathKey, id: WatchId) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.watches.is_current(key, id) {
            crate::debug_event!("registry", "stale delete", "{key} from {id}");
            return;
        }

        self.supervisor.stop_watch(&mut state.watches, key);
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        entry.set_state(EntryState::Deleted);
        let name = entry.display_name().to_string();

        self.publish_files(&state.entries);
        self.activity.warn(format!("File deleted: {name}"));
    }
}

/// Routes one watch's callbacks back into the registry.
struct WatchBinding {
    core: Weak<RegistryCore>,
    key: PathKey,
    id: WatchId,
}

impl WatchHandler for WatchBinding {
    fn on_modify(&self, _path: &Path) {
        if let Some(core) = self.core.upgrade() {
            core.on_file_changed(&self.key, self.id);
        }
    }

    fn on_delete(&self, _path: &Path) {
        if let Some(core) = self.core.upgrade() {
            core.on_file_deleted(&self.key, self.id);
        }
    }
}

fn file_views(entries: &IndexMap<PathKey, WatchEntry>) -> Vec<FileView> {
    entries.values().map(WatchEntry::view).collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use crate::watcher::{FsEvent, Subscription};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    /// Event source driven by the test; keeps one sender per subscription.
    #[derive(Default)]
    struct ManualSource {
        senders: parking_lot::Mutex<Vec<(PathBuf, mpsc::Sender<FsEvent>)>>,
        subscribes: AtomicUsize,
    }

    impl ManualSource {
        fn emit(&self, path: &Path, event: FsEvent) {
            let senders = self.senders.lock();
            if let Some((_, tx)) = senders.iter().rev().find(|(p, _)| p == path) {
                let _ = tx.try_send(event);
            }
        }
    }

    impl WatchSource for ManualSource {
        fn subscribe(&self, path: &Path) -> Result<Subscription, WatchError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(32);
            self.senders.lock().push((path.to_path_buf(), tx));
            Ok(Subscription::new(rx, ()))
        }
    }

    struct Fixture {
        dir: TempDir,
        source: Arc<ManualSource>,
        registry: FileRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_renderer(Arc::new(|path: &Path| {
                std::fs::read_to_string(path).map_err(|source| RenderError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }))
        }

        fn with_renderer(renderer: Arc<dyn Renderer>) -> Self {
            let source = Arc::new(ManualSource::default());
            let options = RegistryOptions {
                timing: WatchTiming {
                    debounce: Duration::from_millis(20),
                    delete_grace: Duration::from_millis(60),
                },
                case_rule: CaseRule::Sensitive,
                ..Default::default()
            };
            let registry = FileRegistry::new(options, renderer, source.clone()).unwrap();
            Self {
                dir: TempDir::new().unwrap(),
                source,
                registry,
            }
        }

        fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            path
        }
    }

    async fn next_message(session: &mut Session) -> Message {
        let payload = timeout(Duration::from_secs(1), session.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&payload).unwrap()
    }

    /// Skip replay and activity-log traffic.
    async fn next_state_message(session: &mut Session) -> Message {
        loop {
            let message = next_message(session).await;
            if !matches!(message, Message::Log { .. } | Message::Logs { .. }) {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");

        fx.registry.register(&path, false).unwrap();
        let err = fx.registry.register(&path, true).unwrap_err();

        assert!(matches!(err, HubError::AlreadyRegistered { ref name } if name == "a.md"));
        assert!(err.is_input_error());
        assert_eq!(fx.registry.snapshot().len(), 1);
        assert_eq!(fx.registry.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_register_returns_stored_view() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");

        let view = fx.registry.register(&path, false).unwrap();
        assert_eq!(view.name, "a.md");
        assert_eq!(view.html, "one");
        assert!(!view.active);
        assert!(!view.deleted);
        assert_eq!(fx.registry.files(), vec![view]);
    }

    #[tokio::test]
    async fn test_register_case_insensitive_duplicate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.md");
        std::fs::write(&path, "x").unwrap();

        let registry = FileRegistry::new(
            RegistryOptions {
                case_rule: CaseRule::Insensitive,
                ..Default::default()
            },
            Arc::new(|_: &Path| Ok::<_, RenderError>(String::from("<p>x</p>"))),
            Arc::new(ManualSource::default()),
        )
        .unwrap();

        registry.register(&path, false).unwrap();
        let upper = dir.path().join("NOTES.MD");
        let err = registry.register(&upper, false).unwrap_err();
        assert!(matches!(err, HubError::AlreadyRegistered { .. }));
        assert!(registry.get(&upper).is_some());
    }

    #[tokio::test]
    async fn test_register_render_failure_leaves_no_entry() {
        let fx = Fixture::with_renderer(Arc::new(|path: &Path| {
            Err(RenderError::NotAFile {
                path: path.to_path_buf(),
            })
        }));
        let path = fx.file("a.md", "one");

        let err = fx.registry.register(&path, true).unwrap_err();
        assert!(matches!(err, HubError::Render(_)));
        assert!(!err.is_input_error());
        assert!(fx.registry.snapshot().is_empty());
        assert_eq!(fx.registry.watch_count(), 0);
        assert_eq!(fx.source.subscribes.load(Ordering::SeqCst), 0);

        let logs = fx.registry.logs();
        assert!(logs.last().unwrap().message.starts_with("Cannot watch a.md"));
    }

    #[tokio::test]
    async fn test_register_missing_file_is_io_error() {
        let fx = Fixture::new();
        let err = fx
            .registry
            .register(&fx.dir.path().join("absent.md"), false)
            .unwrap_err();
        assert!(matches!(err, HubError::Io { .. }));
    }

    #[tokio::test]
    async fn test_activate_deactivate_lifecycle() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");

        fx.registry.register(&path, false).unwrap();
        assert_eq!(fx.registry.get(&path).unwrap().state(), EntryState::Registered);

        fx.registry.activate(&path).unwrap();
        fx.registry.activate(&path).unwrap();
        assert_eq!(fx.registry.get(&path).unwrap().state(), EntryState::Active);
        assert_eq!(fx.registry.watch_count(), 1);
        assert_eq!(fx.source.subscribes.load(Ordering::SeqCst), 1);

        fx.registry.deactivate(&path).unwrap();
        fx.registry.deactivate(&path).unwrap();
        assert_eq!(fx.registry.get(&path).unwrap().state(), EntryState::Registered);
        assert_eq!(fx.registry.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_registered() {
        let fx = Fixture::new();
        let path = fx.dir.path().join("ghost.md");

        for result in [
            fx.registry.activate(&path),
            fx.registry.deactivate(&path),
            fx.registry.remove(&path),
        ] {
            assert!(matches!(result, Err(HubError::NotRegistered { .. })));
        }
    }

    #[tokio::test]
    async fn test_rapid_toggle_keeps_single_watch() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let registry = fx.registry.clone();
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    registry.activate(&path).unwrap();
                } else {
                    registry.deactivate(&path).unwrap();
                }
                assert!(registry.watch_count() <= 1);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        fx.registry.activate(&path).unwrap();
        assert_eq!(fx.registry.watch_count(), 1);
    }

    #[tokio::test]
    async fn test_change_burst_publishes_one_update() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();
        let before = fx.registry.get(&path).unwrap().last_changed_at();

        let mut session = fx.registry.join_session();
        assert!(matches!(next_message(&mut session).await, Message::Files { .. }));

        sleep(Duration::from_millis(10)).await;
        std::fs::write(&path, "two").unwrap();
        for _ in 0..5 {
            fx.source.emit(&path, FsEvent::Modified);
        }

        match next_state_message(&mut session).await {
            Message::Update { file } => {
                assert_eq!(file.html, "two");
                assert!(file.last_change > before);
            }
            other => panic!("expected update, got {other:?}"),
        }

        sleep(Duration::from_millis(80)).await;
        while let Some(payload) = session.try_recv() {
            let message: Message = serde_json::from_str(&payload).unwrap();
            assert!(!matches!(message, Message::Update { .. }));
        }
    }

    #[tokio::test]
    async fn test_render_error_on_change_keeps_content() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fx = Fixture::with_renderer(Arc::new(move |path: &Path| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(format!("first render of {}", path.display()))
            } else {
                Err(RenderError::NotAFile {
                    path: path.to_path_buf(),
                })
            }
        }));
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();

        fx.source.emit(&path, FsEvent::Modified);
        sleep(Duration::from_millis(80)).await;

        let entry = fx.registry.get(&path).unwrap();
        assert!(entry.rendered_content().starts_with("first render"));
        assert_eq!(entry.state(), EntryState::Active);
        assert!(fx.registry.logs().iter().any(|log| log.message.starts_with("Error rendering")));
    }

    #[tokio::test]
    async fn test_delete_marks_entry_deleted() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();
        let mut session = fx.registry.join_session();
        assert!(matches!(next_message(&mut session).await, Message::Files { .. }));

        std::fs::remove_file(&path).unwrap();
        fx.source.emit(&path, FsEvent::Removed);

        match next_state_message(&mut session).await {
            Message::Files { files } => {
                assert!(files[0].deleted);
                assert!(!files[0].active);
                assert_eq!(files[0].html, "one");
            }
            other => panic!("expected files, got {other:?}"),
        }
        assert_eq!(fx.registry.get(&path).unwrap().state(), EntryState::Deleted);
        assert_eq!(fx.registry.watch_count(), 0);

        // Deleted entries are not revived by deactivate, nor by activate
        // while the file is still missing
        fx.registry.deactivate(&path).unwrap();
        assert!(matches!(fx.registry.activate(&path), Err(HubError::Io { .. })));
        assert_eq!(fx.registry.get(&path).unwrap().state(), EntryState::Deleted);

        std::fs::write(&path, "back").unwrap();
        fx.registry.activate(&path).unwrap();
        let entry = fx.registry.get(&path).unwrap();
        assert_eq!(entry.state(), EntryState::Active);
        assert_eq!(entry.rendered_content(), "back");
    }

    #[tokio::test]
    async fn test_remove_all_deleted_counts_exactly() {
        let fx = Fixture::new();
        let kept = fx.file("kept.md", "k");
        let gone = fx.file("gone.md", "g");
        fx.registry.register(&kept, true).unwrap();
        fx.registry.register(&gone, true).unwrap();

        std::fs::remove_file(&gone).unwrap();
        fx.source.emit(&gone, FsEvent::Removed);
        sleep(Duration::from_millis(150)).await;

        assert_eq!(fx.registry.remove_all_deleted(), 1);
        assert_eq!(fx.registry.remove_all_deleted(), 0);

        let names: Vec<String> = fx
            .registry
            .snapshot()
            .iter()
            .map(|entry| entry.display_name().to_string())
            .collect();
        assert_eq!(names, vec!["kept.md"]);
    }

    #[tokio::test]
    async fn test_remove_publishes_removed() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();
        let mut session = fx.registry.join_session();
        assert!(matches!(next_message(&mut session).await, Message::Files { .. }));

        fx.registry.remove(&path).unwrap();

        assert_eq!(
            next_state_message(&mut session).await,
            Message::Removed {
                path: path.display().to_string()
            }
        );
        assert_eq!(fx.registry.watch_count(), 0);
        assert!(fx.registry.get(&path).is_none());
    }

    #[tokio::test]
    async fn test_stale_callbacks_are_ignored() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();
        let first_id = WatchId::for_test(1);

        fx.registry.deactivate(&path).unwrap();
        fx.registry.activate(&path).unwrap();

        let key = CaseRule::Sensitive.key(&path);
        fx.registry.core.on_file_deleted(&key, first_id);
        assert_eq!(fx.registry.get(&path).unwrap().state(), EntryState::Active);
        assert_eq!(fx.registry.watch_count(), 1);
    }

    #[tokio::test]
    async fn test_change_after_delete_does_not_revive() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();

        std::fs::remove_file(&path).unwrap();
        fx.source.emit(&path, FsEvent::Removed);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(fx.registry.get(&path).unwrap().state(), EntryState::Deleted);

        std::fs::write(&path, "back").unwrap();
        let key = CaseRule::Sensitive.key(&path);
        for id in 1..4 {
            fx.registry.core.on_file_changed(&key, WatchId::for_test(id));
        }
        let entry = fx.registry.get(&path).unwrap();
        assert_eq!(entry.state(), EntryState::Deleted);
        assert_eq!(entry.rendered_content(), "one");
    }

    #[tokio::test]
    async fn test_join_announces_itself_in_its_replay() {
        let fx = Fixture::new();
        let mut first = fx.registry.join_session();
        let mut second = fx.registry.join_session();

        assert!(matches!(next_message(&mut second).await, Message::Files { .. }));
        match next_message(&mut second).await {
            Message::Logs { logs } => {
                let connected = logs
                    .iter()
                    .filter(|log| log.message == "Browser connected")
                    .count();
                assert_eq!(connected, 2);
            }
            other => panic!("expected logs, got {other:?}"),
        }
        assert!(second.try_recv().is_none());

        // The earlier viewer hears about the later one live
        assert!(matches!(next_message(&mut first).await, Message::Files { .. }));
        assert!(matches!(next_message(&mut first).await, Message::Logs { .. }));
        match next_message(&mut first).await {
            Message::Log { log } => assert_eq!(log.message, "Browser connected"),
            other => panic!("expected log, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let fx = Fixture::new();
        let path = fx.file("a.md", "one");
        fx.registry.register(&path, true).unwrap();
        let mut session = fx.registry.join_session();

        fx.registry.shutdown();
        fx.registry.shutdown();

        assert_eq!(fx.registry.watch_count(), 0);
        assert!(fx.registry.is_shut_down());
        while session.recv().await.is_some() {}
        let other = fx.file("b.md", "two");
        assert!(matches!(
            fx.registry.register(&other, false),
            Err(HubError::ShutDown)
        ));
    }
}
