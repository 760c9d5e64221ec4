//! Synchronous tree state and the list algorithms behind every store operation.
//!
//! Nothing in here awaits. The async store takes the lock, calls one of the
//! `begin_*` methods, releases it around the port call, then hands the result
//! to the matching `finish_*` method, which re-resolves everything against
//! the state as it is *now*.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::node::Node;
use super::visible::visible_nodes;

/// Outcome of the synchronous half of a directory toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleStep {
    /// Unknown id, or the node is not a directory.
    Ignored,
    Collapsed,
    /// Expanded from the cached children.
    Expanded,
    /// Expanded while a fetch for the same directory is still in flight.
    AwaitingFetch,
    /// Expanded optimistically; the caller must fetch the children.
    Fetch,
}

/// Flattened tree plus its expansion bookkeeping.
#[derive(Debug, Default)]
pub struct TreeState {
    nodes: Vec<Node>,
    root: Option<PathBuf>,
    initial_depth: usize,
    expanded: HashSet<PathBuf>,
    loaded: HashSet<PathBuf>,
    loading: HashSet<PathBuf>,
    /// The root's own children have been listed at least once.
    root_loaded: bool,
    /// Bumped when a root load begins; continuations from older generations are stale.
    generation: u64,
    /// Bumped on every mutation; keys the visible-rows memo.
    revision: u64,
    visible: Option<(u64, Arc<Vec<Node>>)>,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn initial_depth(&self) -> usize {
        self.initial_depth
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_expanded(&self, id: &Path) -> bool {
        self.expanded.contains(id)
    }

    pub fn is_loaded(&self, id: &Path) -> bool {
        self.loaded.contains(id)
    }

    pub fn is_loading(&self, id: &Path) -> bool {
        self.loading.contains(id)
    }

    /// Whether `dir` has a cached children listing that watcher events should keep current.
    pub fn is_listing_cached(&self, dir: &Path) -> bool {
        if self.root.as_deref() == Some(dir) {
            self.root_loaded
        } else {
            self.loaded.contains(dir)
        }
    }

    /// Find the index of a node by its path.
    pub fn find_index(&self, id: &Path) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Switch to `root`. Every continuation started before this call becomes stale.
    ///
    /// The previous nodes stay in place until [`finish_root`](Self::finish_root)
    /// succeeds, so a failed load leaves the last good tree on screen.
    pub fn begin_root(&mut self, root: PathBuf, initial_depth: usize) -> u64 {
        self.root = Some(root);
        self.initial_depth = initial_depth;
        self.root_loaded = false;
        self.loading.clear();
        self.generation = self.generation.wrapping_add(1);
        self.touch();
        self.generation
    }

    /// Install a fresh root snapshot, discarding all expansion state.
    pub fn finish_root(&mut self, generation: u64, nodes: Vec<Node>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.nodes = nodes;
        self.expanded.clear();
        self.loaded.clear();
        self.loading.clear();
        self.root_loaded = true;
        self.touch();
        true
    }

    /// Flip a directory's expansion bit and report whether a fetch is needed.
    pub fn begin_toggle(&mut self, id: &Path) -> ToggleStep {
        match self.find_index(id) {
            Some(index) if self.nodes[index].is_dir() => {}
            _ => return ToggleStep::Ignored,
        }
        self.touch();

        if self.expanded.remove(id) {
            return ToggleStep::Collapsed;
        }
        self.expanded.insert(id.to_path_buf());

        if self.loaded.contains(id) {
            ToggleStep::Expanded
        } else if !self.loading.insert(id.to_path_buf()) {
            ToggleStep::AwaitingFetch
        } else {
            ToggleStep::Fetch
        }
    }

    /// Complete a fetch started by [`begin_toggle`](Self::begin_toggle).
    ///
    /// `children` is `None` when the fetch failed. Returns whether the
    /// children were spliced in; a directory that vanished meanwhile, or a
    /// root change, makes the result stale and it is dropped.
    pub fn finish_toggle(&mut self, generation: u64, id: &Path, children: Option<Vec<Node>>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.loading.remove(id);
        self.touch();

        let Some(children) = children else {
            return false;
        };
        if !self.splice_children(id, children) {
            return false;
        }
        self.loaded.insert(id.to_path_buf());
        true
    }

    /// Replace the known children run of `parent` with a fresh listing.
    ///
    /// `parent` may be the root, in which case the whole top level is the run.
    /// Child depths are rebased to `parent_depth + 1 + relative_depth`.
    /// Cached subtrees of surviving child directories are kept.
    pub fn splice_children(&mut self, parent: &Path, fresh: Vec<Node>) -> bool {
        let is_root = self.root.as_deref() == Some(parent);
        let (start, end, base) = if is_root {
            (0, self.nodes.len(), 0)
        } else {
            let Some(index) = self.find_index(parent) else {
                return false;
            };
            if !self.nodes[index].is_dir() {
                return false;
            }
            (
                index + 1,
                descendant_end(&self.nodes, index),
                self.nodes[index].depth + 1,
            )
        };

        let fresh: Vec<Node> = fresh
            .into_iter()
            .map(|mut node| {
                node.depth += base;
                node
            })
            .collect();

        let mut merged = Vec::with_capacity(fresh.len() + (end - start));
        // Nothing in a single listing is authoritative below its own level.
        merge_block(&fresh, &self.nodes[start..end], base, &mut merged, &mut Vec::new());
        self.nodes.splice(start..end, merged);

        if is_root {
            self.root_loaded = true;
        }
        self.prune();
        self.touch();
        true
    }

    /// Merge a coarse root snapshot over the current list.
    ///
    /// Levels shallower than the snapshot depth are taken from the snapshot;
    /// subtrees cached below its deepest level are re-attached to their
    /// surviving directories.
    pub fn merge_snapshot(&mut self, generation: u64, fresh: Vec<Node>) -> bool {
        if generation != self.generation {
            return false;
        }
        let mut merged = Vec::with_capacity(fresh.len().max(self.nodes.len()));
        let mut dropped = Vec::new();
        merge_block(&fresh, &self.nodes, self.initial_depth, &mut merged, &mut dropped);
        self.nodes = merged;
        self.forget_listings(&dropped);
        self.root_loaded = true;
        self.prune();
        self.touch();
        true
    }

    /// Remove every node equal to or beneath any of `paths`. Returns how many went.
    pub fn remove_paths(&mut self, paths: &[PathBuf]) -> usize {
        if paths.is_empty() {
            return 0;
        }
        let before = self.nodes.len();
        self.nodes
            .retain(|node| !paths.iter().any(|path| node.is_within(path)));
        let removed = before - self.nodes.len();
        if removed > 0 {
            self.prune();
            self.touch();
        }
        removed
    }

    /// A merge emptied these directories' cached runs; the next expand re-fetches.
    fn forget_listings(&mut self, dirs: &[PathBuf]) {
        for dir in dirs {
            self.loaded.remove(dir);
            self.expanded.remove(dir);
        }
    }

    /// Drop expansion bookkeeping for nodes that are no longer in the list.
    ///
    /// `loading` is left alone: the fetch that set it always clears it.
    fn prune(&mut self) {
        let present: HashSet<&Path> = self.nodes.iter().map(|n| n.id.as_path()).collect();
        self.expanded.retain(|id| present.contains(id.as_path()));
        self.loaded.retain(|id| present.contains(id.as_path()));
    }

    /// Visible rows, recomputed only when the state changed since the last call.
    pub fn visible(&mut self) -> Arc<Vec<Node>> {
        if let Some((revision, rows)) = &self.visible {
            if *revision == self.revision {
                return Arc::clone(rows);
            }
        }
        let rows = Arc::new(visible_nodes(&self.nodes, &self.expanded));
        self.visible = Some((self.revision, Arc::clone(&rows)));
        rows
    }

    /// Check the contiguity invariant.
    ///
    /// Holds when ids are unique, depth never jumps by more than one, and
    /// every node's nearest shallower predecessor is its parent directory
    /// (or, at depth 0, the node sits directly under the root).
    pub fn is_well_formed(&self) -> bool {
        let mut seen: HashSet<&Path> = HashSet::new();
        let mut ancestors: Vec<&Node> = Vec::new();

        for node in &self.nodes {
            if !seen.insert(node.id.as_path()) {
                return false;
            }
            while ancestors.last().is_some_and(|a| a.depth >= node.depth) {
                ancestors.pop();
            }
            match ancestors.last() {
                Some(parent) => {
                    if !parent.is_dir()
                        || parent.depth + 1 != node.depth
                        || node.id.parent() != Some(parent.id.as_path())
                    {
                        return false;
                    }
                }
                None => {
                    if node.depth != 0 {
                        return false;
                    }
                    if let Some(root) = &self.root {
                        if node.id.parent() != Some(root.as_path()) {
                            return false;
                        }
                    }
                }
            }
            ancestors.push(node);
        }
        true
    }
}

/// Index one past the last descendant of `nodes[index]`.
fn descendant_end(nodes: &[Node], index: usize) -> usize {
    let depth = nodes[index].depth;
    nodes[index + 1..]
        .iter()
        .position(|n| n.depth <= depth)
        .map_or(nodes.len(), |offset| index + 1 + offset)
}

/// Split a block into (head, descendants) groups, one per top-level entry.
fn groups(block: &[Node]) -> Vec<(&Node, &[Node])> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < block.len() {
        let end = descendant_end(block, i);
        out.push((&block[i], &block[i + 1..end]));
        i = end;
    }
    out
}

/// Merge `fresh` over `old`, both blocks of siblings at the same absolute depth.
///
/// The fresh block decides membership and order at its top level. A directory
/// at depth `< authoritative_below` had its children enumerated by the same
/// fetch, so an empty fresh run there means "empty". Deeper directories keep
/// their old cached run unless the fresh block carries one.
///
/// Directories whose non-empty cached run was replaced by an empty one are
/// pushed to `dropped`.
fn merge_block(
    fresh: &[Node],
    old: &[Node],
    authoritative_below: usize,
    out: &mut Vec<Node>,
    dropped: &mut Vec<PathBuf>,
) {
    let old_groups: HashMap<&Path, (&Node, &[Node])> = groups(old)
        .into_iter()
        .map(|(head, desc)| (head.id.as_path(), (head, desc)))
        .collect();

    for (head, fresh_desc) in groups(fresh) {
        out.push(head.clone());
        if !head.is_dir() {
            continue;
        }
        let old_desc: &[Node] = match old_groups.get(head.id.as_path()) {
            Some((prev, desc)) if prev.is_dir() => desc,
            _ => &[],
        };
        if !fresh_desc.is_empty() {
            merge_block(fresh_desc, old_desc, authoritative_below, out, dropped);
        } else if head.depth < authoritative_below {
            if !old_desc.is_empty() {
                dropped.push(head.id.clone());
            }
        } else {
            out.extend_from_slice(old_desc);
        }
    }
}
