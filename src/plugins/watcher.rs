//! Filesystem watcher
//!
//! Observes the plugin directory and turns raw filesystem events into
//! debounced change notifications. Editors tend to emit bursts of writes
//! for a single save; the debouncer coalesces everything for one path into
//! a single notification after a quiet window. Deletions skip the window
//! and cancel any pending notification for the same path.
//!
//! Notifications are delivered sequentially by a dispatch task, so a reload
//! in progress is never interrupted by the next event for the same path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::loader;

/// Quiet window applied to create and modify events
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// What happened to a plugin file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Changed,
    Removed,
}

/// Receiver of settled (post-debounce) change notifications
#[async_trait]
pub trait ChangeSink: Send + Sync + 'static {
    async fn on_path_changed(&self, path: &Path, kind: ChangeKind);
}

/// One pending per-path timer
struct PendingTimer {
    kind: ChangeKind,
    /// Identifies the timer that owns this entry; an aborted timer already
    /// past its sleep must not notify for a newer submission
    seq: u64,
    timer: JoinHandle<()>,
}

/// Coalesces repeated events per path into one notification per quiet window
pub struct Debouncer {
    window: Duration,
    pending: StdMutex<HashMap<PathBuf, PendingTimer>>,
    settled: UnboundedSender<(PathBuf, ChangeKind)>,
    seq: AtomicU64,
}

impl Debouncer {
    /// Spawn the dispatch task and return the debouncer paired with the
    /// task's handle. The task ends when the last `Debouncer` clone drops.
    pub fn spawn(sink: Arc<dyn ChangeSink>, window: Duration) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(PathBuf, ChangeKind)>();

        let dispatch = tokio::spawn(async move {
            // Sequential on purpose; a long reload delays later events
            // rather than racing them
            while let Some((path, kind)) = rx.recv().await {
                sink.on_path_changed(&path, kind).await;
            }
        });

        let debouncer = Arc::new(Self {
            window,
            pending: StdMutex::new(HashMap::new()),
            settled: tx,
            seq: AtomicU64::new(0),
        });
        (debouncer, dispatch)
    }

    /// Feed one raw event into the debouncer.
    ///
    /// Create/change events (re)start the path's quiet-window timer; the
    /// earliest kind wins so a create followed by writes still reports
    /// `Created`. Removals cancel the pending timer and settle immediately.
    pub fn submit(self: &Arc<Self>, path: PathBuf, kind: ChangeKind) {
        let Ok(mut pending) = self.pending.lock() else {
            return;
        };

        if kind == ChangeKind::Removed {
            if let Some(entry) = pending.remove(&path) {
                entry.timer.abort();
            }
            let _ = self.settled.send((path, kind));
            return;
        }

        let kind = match pending.remove(&path) {
            Some(entry) => {
                entry.timer.abort();
                if entry.kind == ChangeKind::Created {
                    ChangeKind::Created
                } else {
                    kind
                }
            }
            None => kind,
        };

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        let timer_path = path.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(this.window).await;
            // Abort can lose the race with the sleep; only the timer that
            // still owns the entry may settle it
            let owns = this.pending.lock().is_ok_and(|mut pending| {
                match pending.get(&timer_path) {
                    Some(entry) if entry.seq == seq => {
                        pending.remove(&timer_path);
                        true
                    }
                    _ => false,
                }
            });
            if owns {
                let _ = this.settled.send((timer_path, kind));
            }
        });
        pending.insert(path, PendingTimer { kind, seq, timer });
    }

    /// Cancel all pending timers. Already-settled notifications still drain
    /// through the dispatch task.
    pub fn cancel_pending(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            for (_, entry) in pending.drain() {
                entry.timer.abort();
            }
        }
    }
}

/// Watches one plugin directory and feeds a [`ChangeSink`]
pub struct PluginWatcher {
    // Held so the OS watch stays registered
    _watcher: RecommendedWatcher,
    debouncer: Arc<Debouncer>,
    translate: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl PluginWatcher {
    /// Start watching `dir`, delivering debounced notifications to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `Watcher` when the OS watch cannot be established.
    pub fn spawn(dir: &Path, sink: Arc<dyn ChangeSink>, window: Duration) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            // Send errors mean shutdown is in progress; nothing to do
            let _ = tx.send(res);
        })
        .map_err(|e| Error::Watcher(e.to_string()))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watcher(e.to_string()))?;

        let (debouncer, dispatch) = Debouncer::spawn(sink, window);

        let debouncer_clone = Arc::clone(&debouncer);
        let translate = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        for (path, kind) in translate_event(&event) {
                            debouncer_clone.submit(path, kind);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "filesystem watcher error");
                    }
                }
            }
        });

        tracing::info!(path = %dir.display(), "watching plugin directory");

        Ok(Self {
            _watcher: watcher,
            debouncer,
            translate,
            dispatch,
        })
    }

    /// Stop watching. Pending quiet-window timers are cancelled; the
    /// notification currently being dispatched is allowed to finish.
    pub async fn shutdown(self) {
        self.translate.abort();
        self.debouncer.cancel_pending();
        drop(self.debouncer);
        drop(self._watcher);
        // The dispatch task exits once the channel drains
        if tokio::time::timeout(Duration::from_secs(5), self.dispatch)
            .await
            .is_err()
        {
            tracing::warn!("watcher dispatch task did not drain in time");
        }
    }
}

/// Map a raw notify event onto plugin-file changes, dropping paths that are
/// not plugin files
fn translate_event(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let kinds: Vec<(usize, ChangeKind)> = match event.kind {
        EventKind::Create(_) => vec![(0, ChangeKind::Created)],
        EventKind::Remove(_) => vec![(0, ChangeKind::Removed)],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![(0, ChangeKind::Removed)],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![(0, ChangeKind::Created)],
        // Rename with both paths: old name goes away, new name appears
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            vec![(0, ChangeKind::Removed), (1, ChangeKind::Created)]
        }
        EventKind::Modify(_) => vec![(0, ChangeKind::Changed)],
        _ => vec![],
    };

    kinds
        .into_iter()
        .filter_map(|(idx, kind)| {
            let path = event.paths.get(idx)?;
            loader::plugin_name(path)?;
            Some((path.clone(), kind))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: AtomicUsize,
        seen: Mutex<Vec<(PathBuf, ChangeKind)>>,
    }

    #[async_trait]
    impl ChangeSink for RecordingSink {
        async fn on_path_changed(&self, path: &Path, kind: ChangeKind) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().await.push((path.to_path_buf(), kind));
        }
    }

    #[tokio::test]
    async fn burst_settles_to_one_notification() {
        let sink = Arc::new(RecordingSink::default());
        let (debouncer, dispatch) = Debouncer::spawn(sink.clone(), Duration::from_millis(30));

        let path = PathBuf::from("/plugins/echo.toml");
        for _ in 0..5 {
            debouncer.submit(path.clone(), ChangeKind::Changed);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        drop(debouncer);
        let _ = dispatch.await;
    }

    #[tokio::test]
    async fn distinct_paths_debounce_independently() {
        let sink = Arc::new(RecordingSink::default());
        let (debouncer, dispatch) = Debouncer::spawn(sink.clone(), Duration::from_millis(30));

        debouncer.submit(PathBuf::from("/plugins/a.toml"), ChangeKind::Changed);
        debouncer.submit(PathBuf::from("/plugins/b.toml"), ChangeKind::Changed);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        drop(debouncer);
        let _ = dispatch.await;
    }

    #[tokio::test]
    async fn create_then_writes_reports_created() {
        let sink = Arc::new(RecordingSink::default());
        let (debouncer, dispatch) = Debouncer::spawn(sink.clone(), Duration::from_millis(30));

        let path = PathBuf::from("/plugins/echo.toml");
        debouncer.submit(path.clone(), ChangeKind::Created);
        debouncer.submit(path.clone(), ChangeKind::Changed);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let seen = sink.seen.lock().await;
        assert_eq!(seen.as_slice(), [(path, ChangeKind::Created)]);
        drop(debouncer);
        let _ = dispatch.await;
    }

    #[tokio::test]
    async fn superseded_timer_does_not_double_notify() {
        let sink = Arc::new(RecordingSink::default());
        let (debouncer, dispatch) = Debouncer::spawn(sink.clone(), Duration::from_millis(30));

        let path = PathBuf::from("/plugins/echo.toml");
        debouncer.submit(path.clone(), ChangeKind::Changed);
        // Detach the entry without aborting its timer, the state a submit
        // racing a timer already past its sleep leaves behind
        let stale = debouncer.pending.lock().unwrap().remove(&path).unwrap();
        debouncer.submit(path.clone(), ChangeKind::Created);
        tokio::time::sleep(Duration::from_millis(120)).await;

        // The stale timer fires but no longer owns the entry, so only the
        // newer submission lands
        {
            let seen = sink.seen.lock().await;
            assert_eq!(seen.as_slice(), [(path, ChangeKind::Created)]);
        }
        drop(stale);
        drop(debouncer);
        let _ = dispatch.await;
    }

    #[tokio::test]
    async fn removal_cancels_pending_change() {
        let sink = Arc::new(RecordingSink::default());
        let (debouncer, dispatch) = Debouncer::spawn(sink.clone(), Duration::from_millis(50));

        let path = PathBuf::from("/plugins/echo.toml");
        debouncer.submit(path.clone(), ChangeKind::Changed);
        debouncer.submit(path.clone(), ChangeKind::Removed);
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Only the removal lands, and it lands without waiting the window
        let seen = sink.seen.lock().await;
        assert_eq!(seen.as_slice(), [(path, ChangeKind::Removed)]);
        drop(debouncer);
        let _ = dispatch.await;
    }

    #[test]
    fn translate_skips_non_plugin_paths() {
        let mut event = Event::new(EventKind::Create(notify::event::CreateKind::File));
        event = event.add_path(PathBuf::from("/plugins/readme.md"));
        assert!(translate_event(&event).is_empty());

        let mut event = Event::new(EventKind::Create(notify::event::CreateKind::File));
        event = event.add_path(PathBuf::from("/plugins/echo.toml"));
        assert_eq!(
            translate_event(&event),
            [(PathBuf::from("/plugins/echo.toml"), ChangeKind::Created)]
        );
    }

    #[test]
    fn translate_rename_both_yields_remove_and_create() {
        let mut event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)));
        event = event.add_path(PathBuf::from("/plugins/old.toml"));
        event = event.add_path(PathBuf::from("/plugins/new.toml"));
        assert_eq!(
            translate_event(&event),
            [
                (PathBuf::from("/plugins/old.toml"), ChangeKind::Removed),
                (PathBuf::from("/plugins/new.toml"), ChangeKind::Created),
            ]
        );
    }

    #[tokio::test]
    async fn watcher_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let watcher =
            PluginWatcher::spawn(dir.path(), sink.clone(), Duration::from_millis(50)).unwrap();

        std::fs::write(dir.path().join("echo.toml"), "[handler]\nkind = \"echo\"\n").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(sink.calls.load(Ordering::SeqCst) >= 1);
        watcher.shutdown().await;
    }
}
