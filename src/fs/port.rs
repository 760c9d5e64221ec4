//! The boundary between the tree store and whatever enumerates and watches files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::node::Node;

/// Filesystem access consumed by the tree store.
///
/// Depths in returned nodes are relative: 0 for the direct children of the
/// listed directory.
#[async_trait]
pub trait FsPort: Send + Sync + 'static {
    /// Flattened pre-order listing of `root`, `depth` levels below its direct children.
    async fn snapshot(&self, root: &Path, depth: usize) -> Result<Vec<Node>>;

    /// Immediate children of `dir`.
    async fn children(&self, dir: &Path) -> Result<Vec<Node>>;

    /// Start emitting change batches for the subtree under `root`.
    async fn watch(&self, root: &Path) -> Result<()>;
}

/// What happened to the paths in a change batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeKind {
    Create,
    Modify,
    Remove,
    /// Too much changed to patch incrementally; relist from the root.
    Rescan,
    Unknown,
}

impl From<&str> for ChangeKind {
    /// Case-insensitive substring match, so backend labels like
    /// `"Create(File)"` or `"remove"` both resolve.
    fn from(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("remove") {
            ChangeKind::Remove
        } else if label.contains("create") {
            ChangeKind::Create
        } else if label.contains("modify") {
            ChangeKind::Modify
        } else if label.contains("rescan") {
            ChangeKind::Rescan
        } else {
            ChangeKind::Unknown
        }
    }
}

impl From<String> for ChangeKind {
    fn from(label: String) -> Self {
        ChangeKind::from(label.as_str())
    }
}

impl From<ChangeKind> for String {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Create => "Create",
            ChangeKind::Modify => "Modify",
            ChangeKind::Remove => "Remove",
            ChangeKind::Rescan => "Rescan",
            ChangeKind::Unknown => "Unknown",
        }
        .to_string()
    }
}

/// A batch of changed paths sharing one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsChange {
    pub paths: Vec<PathBuf>,
    pub kind: ChangeKind,
}

impl FsChange {
    pub fn new(kind: ChangeKind, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            kind,
        }
    }
}
