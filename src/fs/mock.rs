//! Scripted in-memory port for store and bridge tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TreeError};
use crate::fs::port::FsPort;
use crate::tree::node::Node;

#[derive(Default)]
struct Script {
    snapshots: HashMap<PathBuf, Vec<Node>>,
    children: HashMap<PathBuf, Vec<Node>>,
    failing: Vec<PathBuf>,
    gates: HashMap<PathBuf, Arc<Notify>>,
    snapshot_calls: usize,
    children_calls: HashMap<PathBuf, usize>,
    watched: Vec<PathBuf>,
    watch_fails: bool,
}

/// A port whose answers are set up by the test.
///
/// `hold(dir)` makes the next `children(dir)` calls wait until the returned
/// gate is notified, which is how tests keep a fetch in flight.
#[derive(Default)]
pub struct MockFs {
    script: Mutex<Script>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, root: &str, nodes: Vec<Node>) {
        self.script.lock().snapshots.insert(PathBuf::from(root), nodes);
    }

    pub fn set_children(&self, dir: &str, nodes: Vec<Node>) {
        self.script.lock().children.insert(PathBuf::from(dir), nodes);
    }

    pub fn fail(&self, path: &str) {
        self.script.lock().failing.push(PathBuf::from(path));
    }

    pub fn heal(&self, path: &str) {
        self.script.lock().failing.retain(|p| p != Path::new(path));
    }

    pub fn fail_watch(&self) {
        self.script.lock().watch_fails = true;
    }

    pub fn hold(&self, dir: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script
            .lock()
            .gates
            .insert(PathBuf::from(dir), Arc::clone(&gate));
        gate
    }

    pub fn snapshot_calls(&self) -> usize {
        self.script.lock().snapshot_calls
    }

    pub fn children_calls(&self, dir: &str) -> usize {
        self.script
            .lock()
            .children_calls
            .get(Path::new(dir))
            .copied()
            .unwrap_or(0)
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.script.lock().watched.clone()
    }
}

#[async_trait]
impl FsPort for MockFs {
    async fn snapshot(&self, root: &Path, _depth: usize) -> Result<Vec<Node>> {
        let mut script = self.script.lock();
        script.snapshot_calls += 1;
        if script.failing.iter().any(|p| p == root) {
            return Err(TreeError::InvalidPath(root.display().to_string()));
        }
        Ok(script.snapshots.get(root).cloned().unwrap_or_default())
    }

    async fn children(&self, dir: &Path) -> Result<Vec<Node>> {
        let gate = {
            let mut script = self.script.lock();
            *script.children_calls.entry(dir.to_path_buf()).or_default() += 1;
            script.gates.get(dir).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let script = self.script.lock();
        if script.failing.iter().any(|p| p == dir) {
            return Err(TreeError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot list {}", dir.display()),
            )));
        }
        Ok(script.children.get(dir).cloned().unwrap_or_default())
    }

    async fn watch(&self, root: &Path) -> Result<()> {
        let mut script = self.script.lock();
        script.watched.push(root.to_path_buf());
        if script.watch_fails {
            return Err(TreeError::InvalidPath(root.display().to_string()));
        }
        Ok(())
    }
}
