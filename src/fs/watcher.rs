use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{
    new_debouncer, new_debouncer_opt, DebounceEventResult, DebouncedEventKind, Debouncer,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fs::port::{ChangeKind, FsChange};

/// Default patterns to ignore when watching the filesystem.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "target",
];

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default flood threshold (events per debounce window).
pub const DEFAULT_FLOOD_THRESHOLD: usize = 100;

/// Scan interval of the polling backend.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Watcher tuning shared by every root the adapter watches.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub debounce: Duration,
    pub ignore_patterns: Vec<String>,
    pub flood_threshold: usize,
    /// Skip the native backend and poll from the start.
    pub poll: bool,
    pub poll_interval: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            flood_threshold: DEFAULT_FLOOD_THRESHOLD,
            poll: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// The notify backend behind a watcher. Dropping it stops the watch.
#[allow(dead_code)]
enum Backend {
    Native(Debouncer<RecommendedWatcher>),
    Poll(Debouncer<PollWatcher>),
}

/// Turns debounced notify windows into [`FsChange`] batches on the channel.
#[derive(Clone)]
struct Forwarder {
    root: PathBuf,
    active: Arc<AtomicBool>,
    ignore_patterns: Vec<String>,
    flood_threshold: usize,
    change_tx: mpsc::UnboundedSender<FsChange>,
}

impl Forwarder {
    fn forward(&self, result: DebounceEventResult) {
        // If paused, silently drop events
        if !self.active.load(Ordering::Relaxed) {
            return;
        }

        match result {
            Ok(events) => {
                let paths: Vec<PathBuf> = events
                    .iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any)
                    .map(|e| e.path.clone())
                    .filter(|p| !should_ignore(p, &self.ignore_patterns))
                    .collect();

                for change in classify(paths, &self.root, self.flood_threshold) {
                    if self.change_tx.send(change).is_err() {
                        debug!("change receiver dropped");
                        return;
                    }
                }
            }
            Err(err) => {
                // Watcher errors are non-fatal
                warn!(error = %err, "filesystem watcher reported an error");
            }
        }
    }
}

/// Filesystem watcher that monitors a root directory and sends change batches.
pub struct FsWatcher {
    root: PathBuf,
    /// Whether the watcher is currently forwarding events.
    active: Arc<AtomicBool>,
    /// Handle to the debouncer (dropped to stop watching).
    backend: Backend,
}

impl FsWatcher {
    /// Create a new FsWatcher that watches `root` recursively.
    ///
    /// Events are debounced by `settings.debounce` and sent via `change_tx`.
    /// Paths matching any ignore pattern are silently dropped. If more than
    /// `flood_threshold` paths arrive in one debounce window they collapse
    /// into a single [`ChangeKind::Rescan`] of the root.
    ///
    /// When the native backend cannot be created or cannot watch `root`
    /// (inotify limits, network mounts), a polling backend scanning every
    /// `settings.poll_interval` takes over.
    pub fn new(
        root: &Path,
        settings: &WatchSettings,
        change_tx: mpsc::UnboundedSender<FsChange>,
    ) -> notify::Result<Self> {
        let active = Arc::new(AtomicBool::new(true));
        let forwarder = Forwarder {
            root: root.to_path_buf(),
            active: active.clone(),
            ignore_patterns: settings.ignore_patterns.clone(),
            flood_threshold: settings.flood_threshold,
            change_tx,
        };

        let backend = if settings.poll {
            Backend::Poll(start_polling(root, settings, forwarder)?)
        } else {
            match start_native(root, settings, forwarder.clone()) {
                Ok(debouncer) => Backend::Native(debouncer),
                Err(err) => {
                    warn!(
                        root = %root.display(),
                        error = %err,
                        "native watcher unavailable, falling back to polling"
                    );
                    Backend::Poll(start_polling(root, settings, forwarder)?)
                }
            }
        };
        if matches!(backend, Backend::Poll(_)) {
            info!(root = %root.display(), interval = ?settings.poll_interval, "polling for changes");
        }

        Ok(Self {
            root: root.to_path_buf(),
            active,
            backend,
        })
    }

    /// Whether the polling backend is in use.
    pub fn is_polling(&self) -> bool {
        matches!(self.backend, Backend::Poll(_))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pause event forwarding (watcher stays alive to avoid re-creating inotify watches).
    pub fn pause(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Resume event forwarding.
    pub fn resume(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    /// Check if the watcher is currently active (forwarding events).
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

fn start_native(
    root: &Path,
    settings: &WatchSettings,
    forwarder: Forwarder,
) -> notify::Result<Debouncer<RecommendedWatcher>> {
    let mut debouncer = new_debouncer(settings.debounce, move |result: DebounceEventResult| {
        forwarder.forward(result)
    })?;
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
    Ok(debouncer)
}

fn start_polling(
    root: &Path,
    settings: &WatchSettings,
    forwarder: Forwarder,
) -> notify::Result<Debouncer<PollWatcher>> {
    let config = notify_debouncer_mini::Config::default()
        .with_timeout(settings.debounce)
        .with_notify_config(notify::Config::default().with_poll_interval(settings.poll_interval));
    let mut debouncer = new_debouncer_opt::<_, PollWatcher>(config, move |result: DebounceEventResult| {
        forwarder.forward(result)
    })?;
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
    Ok(debouncer)
}

/// Turn one debounce window of raw paths into change batches.
///
/// The debouncer does not say what happened, so paths are split by whether
/// they still exist: gone ones form a `Remove` batch, the rest a `Modify`
/// batch. Floods become a single `Rescan` of `root`.
pub fn classify(paths: Vec<PathBuf>, root: &Path, flood_threshold: usize) -> Vec<FsChange> {
    if paths.is_empty() {
        return Vec::new();
    }
    if paths.len() > flood_threshold {
        return vec![FsChange::new(ChangeKind::Rescan, [root])];
    }

    let (present, gone): (Vec<PathBuf>, Vec<PathBuf>) = paths
        .into_iter()
        .partition(|p| std::fs::symlink_metadata(p).is_ok());

    let mut changes = Vec::with_capacity(2);
    if !gone.is_empty() {
        changes.push(FsChange {
            paths: gone,
            kind: ChangeKind::Remove,
        });
    }
    if !present.is_empty() {
        changes.push(FsChange {
            paths: present,
            kind: ChangeKind::Modify,
        });
    }
    changes
}

/// Check if a path should be ignored based on ignore patterns.
///
/// A path is ignored if any of its components match any ignore pattern exactly.
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    for component in path.components() {
        if let std::path::Component::Normal(name) = component {
            let name_str = name.to_string_lossy();
            for pattern in patterns {
                if name_str == *pattern {
                    return true;
                }
            }
        }
    }
    false
}
