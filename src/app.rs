use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use workspace_tree::fs::LocalFs;
use workspace_tree::tree::{Node, TreeStore};

use crate::event::Event;

/// Explorer state. The tree itself lives in the shared store; the app only
/// tracks the cursor and viewport over its visible rows.
pub struct App {
    pub store: Arc<TreeStore<LocalFs>>,
    events: mpsc::UnboundedSender<Event>,
    pub initial_depth: usize,
    pub selected_index: usize,
    /// Follows the selected node across tree changes.
    selected_id: Option<PathBuf>,
    pub scroll_offset: usize,
    pub should_quit: bool,
    pub status_message: Option<(String, Instant)>,
    /// Starts off; the caller sets it once the watcher is armed.
    pub watcher_active: bool,
    pub use_icons: bool,
    /// Files opened from the tree, most recent last.
    pub opened: Vec<PathBuf>,
}

impl App {
    pub fn new(
        store: Arc<TreeStore<LocalFs>>,
        events: mpsc::UnboundedSender<Event>,
        initial_depth: usize,
        use_icons: bool,
    ) -> Self {
        Self {
            store,
            events,
            initial_depth,
            selected_index: 0,
            selected_id: None,
            scroll_offset: 0,
            should_quit: false,
            status_message: None,
            watcher_active: false,
            use_icons,
            opened: Vec::new(),
        }
    }

    pub fn visible(&self) -> Arc<Vec<Node>> {
        self.store.visible_nodes()
    }

    pub fn selected(&self) -> Option<Node> {
        self.visible().get(self.selected_index).cloned()
    }

    /// Re-anchor the cursor on the selected node after rows moved, or clamp
    /// it when that node is gone.
    pub fn sync_selection(&mut self) {
        let rows = self.visible();
        if rows.is_empty() {
            self.selected_index = 0;
            self.selected_id = None;
            return;
        }
        if let Some(id) = &self.selected_id {
            if let Some(pos) = rows.iter().position(|n| &n.id == id) {
                self.selected_index = pos;
                return;
            }
        }
        self.selected_index = self.selected_index.min(rows.len() - 1);
        self.selected_id = Some(rows[self.selected_index].id.clone());
    }

    fn select_index(&mut self, index: usize) {
        let rows = self.visible();
        if let Some(node) = rows.get(index) {
            self.selected_index = index;
            self.selected_id = Some(node.id.clone());
        }
    }

    pub fn select_next(&mut self) {
        self.select_index(self.selected_index + 1);
    }

    pub fn select_previous(&mut self) {
        if self.selected_index > 0 {
            self.select_index(self.selected_index - 1);
        }
    }

    pub fn select_first(&mut self) {
        self.select_index(0);
    }

    pub fn select_last(&mut self) {
        let len = self.visible().len();
        if len > 0 {
            self.select_index(len - 1);
        }
    }

    /// Keep the selected row inside a viewport of `visible_height` rows.
    pub fn update_scroll(&mut self, visible_height: usize) {
        if visible_height == 0 {
            return;
        }
        if self.selected_index < self.scroll_offset {
            self.scroll_offset = self.selected_index;
        } else if self.selected_index >= self.scroll_offset + visible_height {
            self.scroll_offset = self.selected_index - visible_height + 1;
        }
    }

    /// Toggle a directory row, or open a file row.
    pub fn activate_selected(&mut self) -> Option<JoinHandle<()>> {
        let node = self.selected()?;
        if node.is_dir() {
            Some(self.spawn_toggle(node.id))
        } else {
            self.open_file(&node.id);
            None
        }
    }

    /// Collapse the selected directory if expanded, else move to its parent row.
    pub fn collapse_or_parent(&mut self) -> Option<JoinHandle<()>> {
        let node = self.selected()?;
        if node.is_dir() && self.store.is_expanded(&node.id) {
            return Some(self.spawn_toggle(node.id));
        }
        let parent = node.id.parent()?;
        let pos = self.visible().iter().position(|n| n.id == parent)?;
        self.select_index(pos);
        None
    }

    fn spawn_toggle(&self, id: PathBuf) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(err) = store.toggle_dir(&id).await {
                let _ = events.send(Event::TreeError(err.to_string()));
            }
        })
    }

    /// Re-fetch the root snapshot and merge it in.
    pub fn refresh(&mut self) -> JoinHandle<()> {
        self.set_status_message("Refreshing".into());
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(err) = store.refresh().await {
                let _ = events.send(Event::TreeError(err.to_string()));
            }
        })
    }

    /// Reload the root from scratch, dropping all expansion state.
    pub fn reload(&mut self) -> Option<JoinHandle<()>> {
        let root = self.store.root()?;
        self.selected_index = 0;
        self.selected_id = None;
        self.scroll_offset = 0;
        self.set_status_message(format!("Reloading {}", root.display()));

        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let depth = self.initial_depth;
        Some(tokio::spawn(async move {
            if let Err(err) = store.load_root(root, depth).await {
                let _ = events.send(Event::TreeError(err.to_string()));
            }
        }))
    }

    /// Pause or resume watcher event forwarding.
    pub fn toggle_watcher(&mut self) {
        let port = self.store.port();
        if self.watcher_active {
            port.pause_watcher();
        } else {
            port.resume_watcher();
        }
        self.watcher_active = port.is_watching();
        let msg = if self.watcher_active {
            "Watcher resumed"
        } else {
            "Watcher paused"
        };
        self.set_status_message(msg.into());
    }

    pub fn open_file(&mut self, path: &Path) {
        info!(path = %path.display(), "opened file");
        self.set_status_message(format!("Opened {}", path.display()));
        self.opened.push(path.to_path_buf());
    }

    pub fn handle_tree_error(&mut self, message: String) {
        self.set_status_message(format!("⚠ {}", message));
    }

    pub fn set_status_message(&mut self, msg: String) {
        self.status_message = Some((msg, Instant::now()));
    }

    /// Clear the status message once it has been shown for 3 seconds.
    pub fn clear_expired_status(&mut self) {
        if let Some((_, ref created)) = self.status_message {
            if created.elapsed().as_secs() > 3 {
                self.status_message = None;
            }
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}
