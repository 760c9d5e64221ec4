//! Incrementally maintained, lazily expanded view of a workspace directory tree.
//!
//! [`tree::TreeStore`] owns a flattened pre-order list of nodes and keeps it
//! consistent while directories are expanded, the filesystem changes under
//! it, and the root is swapped. [`fs::FsPort`] is the seam to the disk;
//! [`bridge::WatchBridge`] feeds watcher batches into the store.

pub mod bridge;
pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod tree;

pub use error::{Result, TreeError};
