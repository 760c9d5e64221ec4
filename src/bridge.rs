//! Bridge between the watcher's change stream and a [`TreeStore`].

use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::fs::port::{FsChange, FsPort};
use crate::tree::TreeStore;

/// Quiet period before a debounced refresh fires.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(200);

/// How change batches reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Patch the tree for every batch.
    Incremental,
    /// Restart a timer on every batch and run one coarse refresh when it fires.
    Debounced(Duration),
}

impl Default for ApplyMode {
    fn default() -> Self {
        ApplyMode::Incremental
    }
}

/// Owns the change receiver and the task consuming it.
///
/// The consumer is installed at most once per bridge, no matter how many
/// times the view asks for it.
pub struct WatchBridge {
    mode: ApplyMode,
    changes: Mutex<Option<mpsc::UnboundedReceiver<FsChange>>>,
    attached: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchBridge {
    pub fn new(changes: mpsc::UnboundedReceiver<FsChange>, mode: ApplyMode) -> Self {
        Self {
            mode,
            changes: Mutex::new(Some(changes)),
            attached: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> ApplyMode {
        self.mode
    }

    /// Start feeding changes into `store`. Returns `false` if a consumer was
    /// already installed.
    pub fn ensure_attached<P: FsPort>(&self, store: Arc<TreeStore<P>>) -> bool {
        if self.attached.swap(true, Ordering::SeqCst) {
            return false;
        }
        let Some(changes) = self.changes.lock().take() else {
            return false;
        };

        let handle = match self.mode {
            ApplyMode::Incremental => tokio::spawn(apply_each(store, changes)),
            ApplyMode::Debounced(delay) => tokio::spawn(refresh_after_quiet(store, changes, delay)),
        };
        *self.task.lock() = Some(handle);
        debug!(mode = ?self.mode, "watch bridge attached");
        true
    }

    /// Stop the consumer task. The bridge cannot be attached again.
    pub fn detach(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("watch bridge detached");
        }
    }

    /// Whether a consumer task is installed and still running.
    pub fn is_attached(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for WatchBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn apply_each<P: FsPort>(
    store: Arc<TreeStore<P>>,
    mut changes: mpsc::UnboundedReceiver<FsChange>,
) {
    while let Some(change) = changes.recv().await {
        if let Err(err) = store.apply_fs_change(&change).await {
            warn!(kind = ?change.kind, error = %err, "failed to apply filesystem change");
        }
    }
    debug!("change stream closed");
}

async fn refresh_after_quiet<P: FsPort>(
    store: Arc<TreeStore<P>>,
    mut changes: mpsc::UnboundedReceiver<FsChange>,
    delay: Duration,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        let armed = deadline;
        let timer = async move {
            match armed {
                Some(at) => sleep_until(at).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            change = changes.recv() => match change {
                Some(change) => {
                    debug!(kind = ?change.kind, paths = change.paths.len(), "deferring refresh");
                    deadline = Some(Instant::now() + delay);
                }
                None => {
                    // Flush a pending refresh before exiting.
                    if deadline.is_some() {
                        refresh(&store).await;
                    }
                    break;
                }
            },
            () = timer => {
                deadline = None;
                refresh(&store).await;
            }
        }
    }
    debug!("change stream closed");
}

async fn refresh<P: FsPort>(store: &TreeStore<P>) {
    if let Err(err) = store.refresh().await {
        warn!(error = %err, "debounced refresh failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFs;
    use crate::fs::port::ChangeKind;
    use crate::tree::Node;
    use std::path::PathBuf;

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn loaded_store() -> (Arc<MockFs>, Arc<TreeStore<MockFs>>) {
        let fs = Arc::new(MockFs::new());
        fs.set_snapshot(
            "/proj",
            vec![Node::dir("/proj/a", 0), Node::file("/proj/b.ts", 0)],
        );
        let store = Arc::new(TreeStore::new(Arc::clone(&fs)));
        store.load_root("/proj", 2).await.unwrap();
        (fs, store)
    }

    #[tokio::test]
    async fn attaches_only_once() {
        let (_fs, store) = loaded_store().await;
        let (_tx, rx) = mpsc::unbounded_channel();
        let bridge = WatchBridge::new(rx, ApplyMode::Incremental);

        assert!(!bridge.is_attached());
        assert!(bridge.ensure_attached(Arc::clone(&store)));
        assert!(!bridge.ensure_attached(Arc::clone(&store)));
        assert!(bridge.is_attached());

        bridge.detach();
        settle().await;
        assert!(!bridge.is_attached());
        assert!(!bridge.ensure_attached(store));
    }

    #[tokio::test]
    async fn incremental_mode_applies_each_batch() {
        let (_fs, store) = loaded_store().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = WatchBridge::new(rx, ApplyMode::Incremental);
        bridge.ensure_attached(Arc::clone(&store));

        tx.send(FsChange::new(ChangeKind::Remove, ["/proj/b.ts"]))
            .unwrap();
        settle().await;

        let ids: Vec<PathBuf> = store.nodes().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![PathBuf::from("/proj/a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_mode_coalesces_bursts_into_one_refresh() {
        let (fs, store) = loaded_store().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = WatchBridge::new(rx, ApplyMode::Debounced(DEFAULT_REFRESH_DELAY));
        bridge.ensure_attached(Arc::clone(&store));
        assert_eq!(fs.snapshot_calls(), 1);

        fs.set_snapshot(
            "/proj",
            vec![
                Node::dir("/proj/a", 0),
                Node::file("/proj/b.ts", 0),
                Node::file("/proj/c.ts", 0),
            ],
        );
        for name in ["/proj/c.ts", "/proj/c.ts", "/proj/b.ts"] {
            tx.send(FsChange::new(ChangeKind::Modify, [name])).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        // Timer restarted by the last batch; nothing has fired yet.
        assert_eq!(fs.snapshot_calls(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(fs.snapshot_calls(), 2);
        assert_eq!(store.nodes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_mode_flushes_when_stream_closes() {
        let (fs, store) = loaded_store().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = WatchBridge::new(rx, ApplyMode::Debounced(Duration::from_secs(60)));
        bridge.ensure_attached(Arc::clone(&store));

        tx.send(FsChange::new(ChangeKind::Create, ["/proj/new.ts"]))
            .unwrap();
        settle().await;
        drop(tx);
        settle().await;

        assert_eq!(fs.snapshot_calls(), 2);
        assert!(!bridge.is_attached());
        assert_eq!(store.root(), Some(PathBuf::from("/proj")));
    }
}
