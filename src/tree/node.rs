use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Type of filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    #[serde(rename = "dir")]
    Directory,
}

/// One filesystem entry in the flattened tree.
///
/// `id` is the absolute path and doubles as the node's identity. `depth` is
/// relative to the tree root: the root's direct children sit at depth 0.
/// Ports return depths relative to whatever they enumerated; the store
/// rebases them when splicing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: PathBuf,
    pub name: String,
    pub depth: usize,
    pub kind: NodeKind,
}

impl Node {
    /// Build a node for `path`, deriving the display name from its last component.
    pub fn new(path: impl Into<PathBuf>, depth: usize, kind: NodeKind) -> Self {
        let id = path.into();
        let name = id
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| id.to_string_lossy().to_string());
        Self {
            id,
            name,
            depth,
            kind,
        }
    }

    pub fn file(path: impl Into<PathBuf>, depth: usize) -> Self {
        Self::new(path, depth, NodeKind::File)
    }

    pub fn dir(path: impl Into<PathBuf>, depth: usize) -> Self {
        Self::new(path, depth, NodeKind::Directory)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Whether this node is `path` itself or lives somewhere beneath it.
    ///
    /// Matching is component-wise, so `/p/ab` is not under `/p/a`.
    pub fn is_within(&self, path: &Path) -> bool {
        self.id.starts_with(path)
    }
}

/// Sibling ordering: optionally directories first, then case-insensitive name.
pub fn compare_siblings(a: &Node, b: &Node, dirs_first: bool) -> Ordering {
    let mut cmp = Ordering::Equal;
    if dirs_first {
        cmp = b.is_dir().cmp(&a.is_dir());
    }
    cmp.then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort a flat list of siblings in place.
pub fn sort_siblings(nodes: &mut [Node], dirs_first: bool) {
    nodes.sort_by(|a, b| compare_siblings(a, b, dirs_first));
}
