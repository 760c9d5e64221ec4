//! Projection of the flattened node list onto the rows a renderer shows.

use std::collections::HashSet;
use std::path::PathBuf;

use super::node::Node;

/// Derive the visible subsequence of `nodes`.
///
/// A node is visible when every directory on its ancestor chain is in
/// `expanded`. Relies on the contiguity of each directory's descendant run:
/// once a collapsed directory is emitted, everything strictly deeper is
/// skipped until depth returns to its level or shallower.
pub fn visible_nodes(nodes: &[Node], expanded: &HashSet<PathBuf>) -> Vec<Node> {
    let mut visible = Vec::with_capacity(nodes.len());
    let mut skip_depth: Option<usize> = None;

    for node in nodes {
        if let Some(depth) = skip_depth {
            if node.depth > depth {
                continue;
            }
            skip_depth = None;
        }

        visible.push(node.clone());

        if node.is_dir() && !expanded.contains(&node.id) {
            skip_depth = Some(node.depth);
        }
    }

    visible
}
