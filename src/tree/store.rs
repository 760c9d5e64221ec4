//! Async tree store: owns the flattened tree and drives the filesystem port.
//!
//! The state lock is only taken for short synchronous sections and is never
//! held across an `.await`. Every continuation re-reads the state after its
//! port call returns and discards results that no longer apply.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fs::port::{ChangeKind, FsChange, FsPort};
use crate::tree::node::Node;
use crate::tree::state::{ToggleStep, TreeState};

/// Snapshot depth used for the first paint of a new root.
pub const DEFAULT_INITIAL_DEPTH: usize = 2;

/// Shared, incrementally maintained projection of one workspace root.
pub struct TreeStore<P: FsPort> {
    port: Arc<P>,
    state: Mutex<TreeState>,
}

impl<P: FsPort> TreeStore<P> {
    pub fn new(port: Arc<P>) -> Self {
        Self {
            port,
            state: Mutex::new(TreeState::new()),
        }
    }

    pub fn port(&self) -> &Arc<P> {
        &self.port
    }

    /// Load `root` from scratch: fetch a shallow snapshot, reset all
    /// expansion state, then arm the watcher.
    ///
    /// Calling it again for the same root is a hard refresh. On failure the
    /// previous nodes are kept and the error is returned.
    pub async fn load_root(&self, root: impl Into<PathBuf>, initial_depth: usize) -> Result<()> {
        let root = root.into();
        let generation = self.state.lock().begin_root(root.clone(), initial_depth);

        let nodes = match self.port.snapshot(&root, initial_depth).await {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "root snapshot failed");
                return Err(err);
            }
        };

        let count = nodes.len();
        if !self.state.lock().finish_root(generation, nodes) {
            debug!(root = %root.display(), "discarding snapshot for superseded root");
            return Ok(());
        }
        info!(root = %root.display(), nodes = count, "loaded workspace root");

        let port = Arc::clone(&self.port);
        tokio::spawn(async move {
            if let Err(err) = port.watch(&root).await {
                warn!(root = %root.display(), error = %err, "filesystem watch unavailable");
            }
        });
        Ok(())
    }

    /// Expand or collapse a directory, fetching its children on first expand.
    pub async fn toggle_dir(&self, id: &Path) -> Result<()> {
        let (step, generation) = {
            let mut state = self.state.lock();
            (state.begin_toggle(id), state.generation())
        };
        if step != ToggleStep::Fetch {
            debug!(dir = %id.display(), ?step, "toggled directory");
            return Ok(());
        }

        let fetched = self.port.children(id).await;

        let mut state = self.state.lock();
        match fetched {
            Ok(children) => {
                if !state.finish_toggle(generation, id, Some(children)) {
                    debug!(dir = %id.display(), "discarding stale children listing");
                }
                Ok(())
            }
            Err(err) => {
                state.finish_toggle(generation, id, None);
                warn!(dir = %id.display(), error = %err, "failed to list directory");
                Err(err)
            }
        }
    }

    /// Re-fetch the root snapshot and merge it over the current tree.
    pub async fn refresh(&self) -> Result<()> {
        let (root, depth, generation) = {
            let state = self.state.lock();
            match state.root() {
                Some(root) => (
                    root.to_path_buf(),
                    state.initial_depth(),
                    state.generation(),
                ),
                None => return Ok(()),
            }
        };

        let nodes = match self.port.snapshot(&root, depth).await {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "refresh snapshot failed");
                return Err(err);
            }
        };

        if self.state.lock().merge_snapshot(generation, nodes) {
            debug!(root = %root.display(), "refreshed tree");
        } else {
            debug!(root = %root.display(), "discarding stale refresh");
        }
        Ok(())
    }

    /// Patch the tree for one watcher batch.
    ///
    /// Removals are applied in place. Creations and modifications re-list
    /// only the parents whose children are cached; everything else is
    /// skipped because nobody has looked inside it yet.
    pub async fn apply_fs_change(&self, change: &FsChange) -> Result<()> {
        if change.paths.is_empty() {
            return Ok(());
        }
        match change.kind {
            ChangeKind::Remove => {
                let removed = self.state.lock().remove_paths(&change.paths);
                debug!(removed, "applied removal batch");
                Ok(())
            }
            ChangeKind::Create | ChangeKind::Modify => self.relist_parents(&change.paths).await,
            ChangeKind::Rescan => self.refresh().await,
            ChangeKind::Unknown => Ok(()),
        }
    }

    async fn relist_parents(&self, paths: &[PathBuf]) -> Result<()> {
        let (parents, generation) = {
            let state = self.state.lock();
            let Some(root) = state.root() else {
                return Ok(());
            };
            let mut seen = HashSet::new();
            let parents: Vec<PathBuf> = paths
                .iter()
                .map(|path| parent_dir(path, root))
                .filter(|dir| seen.insert(dir.clone()))
                .filter(|dir| {
                    let cached = state.is_listing_cached(dir);
                    if !cached {
                        debug!(dir = %dir.display(), "skipping change under unloaded directory");
                    }
                    cached
                })
                .collect();
            (parents, state.generation())
        };

        let mut pending: FuturesUnordered<_> = parents
            .into_iter()
            .map(|dir| async move {
                let listing = self.port.children(&dir).await;
                (dir, listing)
            })
            .collect();

        let mut first_error = None;
        while let Some((dir, listing)) = pending.next().await {
            match listing {
                Ok(children) => {
                    let mut state = self.state.lock();
                    if state.generation() != generation || !state.splice_children(&dir, children) {
                        debug!(dir = %dir.display(), "discarding stale relist");
                    }
                }
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "failed to relist directory");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Rows to render: nodes reachable through expanded directories, in order.
    pub fn visible_nodes(&self) -> Arc<Vec<Node>> {
        self.state.lock().visible()
    }

    /// Run `f` against the current state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&TreeState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.read(|state| state.root().map(Path::to_path_buf))
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.read(|state| state.nodes().to_vec())
    }

    /// Cached nodes no deeper than `max_depth`, expanded or not.
    pub fn nodes_to_depth(&self, max_depth: usize) -> Vec<Node> {
        self.read(|state| {
            state
                .nodes()
                .iter()
                .filter(|node| node.depth <= max_depth)
                .cloned()
                .collect()
        })
    }

    /// Cached nodes equal to or beneath `prefix`, compared by path component.
    pub fn nodes_under(&self, prefix: &Path) -> Vec<Node> {
        self.read(|state| {
            state
                .nodes()
                .iter()
                .filter(|node| node.is_within(prefix))
                .cloned()
                .collect()
        })
    }

    pub fn is_expanded(&self, id: &Path) -> bool {
        self.read(|state| state.is_expanded(id))
    }

    pub fn is_loaded(&self, id: &Path) -> bool {
        self.read(|state| state.is_loaded(id))
    }

    pub fn is_loading(&self, id: &Path) -> bool {
        self.read(|state| state.is_loading(id))
    }
}

/// Directory whose listing a change to `path` affects.
///
/// A change to the root itself, or a path without a usable parent, maps to the root.
fn parent_dir(path: &Path, root: &Path) -> PathBuf {
    if path == root {
        return root.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => root.to_path_buf(),
    }
}
