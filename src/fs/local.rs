//! `FsPort` backed by the local disk.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, TreeError};
use crate::fs::port::{FsChange, FsPort};
use crate::fs::watcher::{FsWatcher, WatchSettings};
use crate::tree::node::{compare_siblings, sort_siblings, Node, NodeKind};

/// Listing and watching options for [`LocalFs`].
#[derive(Debug, Clone)]
pub struct LocalFsOptions {
    pub show_hidden: bool,
    pub dirs_first: bool,
    /// `None` turns `watch` into a no-op.
    pub watch: Option<WatchSettings>,
}

impl Default for LocalFsOptions {
    fn default() -> Self {
        Self {
            show_hidden: false,
            dirs_first: true,
            watch: Some(WatchSettings::default()),
        }
    }
}

/// Local filesystem port. Enumeration runs on the blocking pool.
pub struct LocalFs {
    options: LocalFsOptions,
    change_tx: mpsc::UnboundedSender<FsChange>,
    watcher: Mutex<Option<FsWatcher>>,
}

impl LocalFs {
    pub fn new(options: LocalFsOptions, change_tx: mpsc::UnboundedSender<FsChange>) -> Self {
        Self {
            options,
            change_tx,
            watcher: Mutex::new(None),
        }
    }

    /// Stop forwarding watcher events without tearing the watch down.
    pub fn pause_watcher(&self) {
        if let Some(watcher) = self.watcher.lock().as_ref() {
            watcher.pause();
        }
    }

    pub fn resume_watcher(&self) {
        if let Some(watcher) = self.watcher.lock().as_ref() {
            watcher.resume();
        }
    }

    /// Whether a watcher is installed and forwarding events.
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(|watcher| watcher.is_active())
    }
}

fn node_kind(path: &Path) -> NodeKind {
    // Follows symlinks, so a link to a directory expands like one.
    if path.is_dir() {
        NodeKind::Directory
    } else {
        NodeKind::File
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(TreeError::InvalidPath(format!(
            "{} is not a directory",
            path.display()
        )))
    }
}

/// Pre-order listing of `root` down to `depth` levels below its direct children.
fn read_snapshot(root: &Path, depth: usize, show_hidden: bool, dirs_first: bool) -> Result<Vec<Node>> {
    ensure_dir(root)?;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth + 1)
        .follow_links(true)
        .sort_by(move |a, b| {
            let a = Node::new(a.path(), 0, node_kind(a.path()));
            let b = Node::new(b.path(), 0, node_kind(b.path()));
            compare_siblings(&a, &b, dirs_first)
        })
        .into_iter()
        .filter_entry(move |entry| {
            show_hidden
                || entry.depth() == 0
                || !entry.file_name().to_string_lossy().starts_with('.')
        });

    let mut nodes = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                match link_entry(&err) {
                    Some((path, depth)) if depth > 0 => {
                        let node = Node::new(path, depth - 1, node_kind(path));
                        if show_hidden || !node.is_hidden() {
                            nodes.push(node);
                        }
                    }
                    _ => debug!(error = %err, "skipping unreadable entry"),
                }
                continue;
            }
        };
        // walkdir depth 1 is a direct child of the root, which is depth 0 here.
        nodes.push(Node::new(
            entry.path(),
            entry.depth() - 1,
            node_kind(entry.path()),
        ));
    }
    Ok(nodes)
}

/// Symlinks the walk reports as errors that `read_children` still lists:
/// links back to an ancestor and dangling links. They are kept as leaves.
fn link_entry(err: &walkdir::Error) -> Option<(&Path, usize)> {
    let path = err.path()?;
    let is_link = fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink());
    if err.loop_ancestor().is_some() || (is_link && !path.exists()) {
        Some((path, err.depth()))
    } else {
        None
    }
}

/// Immediate children of `dir`, sorted. Unreadable entries are skipped.
fn read_children(dir: &Path, show_hidden: bool, dirs_first: bool) -> Result<Vec<Node>> {
    ensure_dir(dir)?;

    let mut nodes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        let node = Node::new(&path, 0, node_kind(&path));
        if !show_hidden && node.is_hidden() {
            continue;
        }
        nodes.push(node);
    }
    sort_siblings(&mut nodes, dirs_first);
    Ok(nodes)
}

#[async_trait]
impl FsPort for LocalFs {
    async fn snapshot(&self, root: &Path, depth: usize) -> Result<Vec<Node>> {
        let root = root.to_path_buf();
        let show_hidden = self.options.show_hidden;
        let dirs_first = self.options.dirs_first;
        tokio::task::spawn_blocking(move || read_snapshot(&root, depth, show_hidden, dirs_first))
            .await?
    }

    async fn children(&self, dir: &Path) -> Result<Vec<Node>> {
        let dir: PathBuf = dir.to_path_buf();
        let show_hidden = self.options.show_hidden;
        let dirs_first = self.options.dirs_first;
        tokio::task::spawn_blocking(move || read_children(&dir, show_hidden, dirs_first)).await?
    }

    async fn watch(&self, root: &Path) -> Result<()> {
        let Some(settings) = &self.options.watch else {
            return Ok(());
        };
        let mut slot = self.watcher.lock();
        if slot.as_ref().is_some_and(|w| w.root() == root) {
            return Ok(());
        }
        // Dropping the previous watcher stops it.
        *slot = Some(FsWatcher::new(root, settings, self.change_tx.clone())?);
        info!(root = %root.display(), "watching filesystem");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::create_dir(dir.path().join("beta")).unwrap();
        File::create(dir.path().join("file_a.txt")).unwrap();
        File::create(dir.path().join("file_b.rs")).unwrap();
        File::create(dir.path().join(".hidden")).unwrap();
        fs::create_dir(dir.path().join("alpha").join("nested")).unwrap();
        File::create(dir.path().join("alpha").join("inner.txt")).unwrap();
        File::create(dir.path().join("alpha").join("nested").join("deep.txt")).unwrap();
        dir
    }

    fn port(options: LocalFsOptions) -> LocalFs {
        let (tx, _rx) = mpsc::unbounded_channel();
        LocalFs::new(options, tx)
    }

    fn names(nodes: &[Node]) -> Vec<(&str, usize)> {
        nodes.iter().map(|n| (n.name.as_str(), n.depth)).collect()
    }

    #[tokio::test]
    async fn snapshot_is_preorder_dirs_first_without_hidden() {
        let dir = setup_test_dir();
        let fs = port(LocalFsOptions::default());
        let nodes = fs.snapshot(dir.path(), 2).await.unwrap();
        assert_eq!(
            names(&nodes),
            vec![
                ("alpha", 0),
                ("nested", 1),
                ("deep.txt", 2),
                ("inner.txt", 1),
                ("beta", 0),
                ("file_a.txt", 0),
                ("file_b.rs", 0),
            ]
        );
        assert_eq!(nodes[0].id, dir.path().join("alpha"));
        assert!(nodes[0].is_dir());
    }

    #[tokio::test]
    async fn snapshot_depth_zero_lists_only_top_level() {
        let dir = setup_test_dir();
        let fs = port(LocalFsOptions::default());
        let nodes = fs.snapshot(dir.path(), 0).await.unwrap();
        assert!(nodes.iter().all(|n| n.depth == 0));
        assert_eq!(nodes.len(), 4);
    }

    #[tokio::test]
    async fn snapshot_can_include_hidden() {
        let dir = setup_test_dir();
        let fs = port(LocalFsOptions {
            show_hidden: true,
            ..Default::default()
        });
        let nodes = fs.snapshot(dir.path(), 0).await.unwrap();
        assert!(nodes.iter().any(|n| n.name == ".hidden"));
    }

    #[tokio::test]
    async fn snapshot_of_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let fs = port(LocalFsOptions::default());
        let err = fs.snapshot(&dir.path().join("nope"), 2).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn children_are_relative_depth_zero() {
        let dir = setup_test_dir();
        let fs = port(LocalFsOptions::default());
        let nodes = fs.children(&dir.path().join("alpha")).await.unwrap();
        assert_eq!(names(&nodes), vec![("nested", 0), ("inner.txt", 0)]);
    }

    #[tokio::test]
    async fn children_of_file_fails() {
        let dir = setup_test_dir();
        let fs = port(LocalFsOptions::default());
        assert!(fs.children(&dir.path().join("file_a.txt")).await.is_err());
    }

    #[tokio::test]
    async fn disabled_watch_is_noop() {
        let dir = setup_test_dir();
        let fs = port(LocalFsOptions {
            watch: None,
            ..Default::default()
        });
        fs.watch(dir.path()).await.unwrap();
        assert!(!fs.is_watching());
    }

    #[tokio::test]
    async fn watch_installs_and_pauses() {
        let dir = setup_test_dir();
        let fs = port(LocalFsOptions::default());
        fs.watch(dir.path()).await.unwrap();
        assert!(fs.is_watching());
        fs.pause_watcher();
        assert!(!fs.is_watching());
        fs.resume_watcher();
        assert!(fs.is_watching());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directory_survives_refresh() {
        use crate::tree::TreeStore;
        use std::os::unix::fs::symlink;
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        File::create(dir.path().join("real").join("inner.txt")).unwrap();
        symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let store = TreeStore::new(Arc::new(port(LocalFsOptions {
            watch: None,
            ..Default::default()
        })));
        let link = dir.path().join("link");
        let inner = link.join("inner.txt");
        store.load_root(dir.path(), 2).await.unwrap();
        assert!(store.nodes().iter().any(|n| n.id == inner));

        store.toggle_dir(&link).await.unwrap();
        store.refresh().await.unwrap();
        store.toggle_dir(&link).await.unwrap();
        store.toggle_dir(&link).await.unwrap();

        assert!(store.visible_nodes().iter().any(|n| n.id == inner));
        assert!(store.read(|state| state.is_well_formed()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn link_to_ancestor_is_listed_once_as_leaf() {
        let dir = setup_test_dir();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("alpha").join("up")).unwrap();
        let fs = port(LocalFsOptions::default());

        let nodes = fs.snapshot(dir.path(), 4).await.unwrap();
        let up: Vec<_> = nodes.iter().filter(|n| n.name == "up").collect();
        assert_eq!(up.len(), 1);
        assert!(up[0].is_dir());
        assert_eq!(up[0].depth, 1);
        assert!(!nodes.iter().any(|n| n.id.starts_with(dir.path().join("alpha").join("up").join("alpha"))));

        let below = fs.children(&dir.path().join("alpha").join("up")).await.unwrap();
        assert!(below.iter().any(|n| n.name == "alpha"));
    }
}
