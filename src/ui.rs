use ratatui::{
    layout::{Constraint, Layout},
    widgets::{Block, Borders},
    Frame,
};

use crate::app::App;
use crate::components::status_bar::StatusBarWidget;
use crate::components::tree::{TreeRow, TreeWidget};

/// Render the explorer: bordered tree on top, one status line below.
pub fn render(app: &mut App, frame: &mut Frame) {
    let [tree_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

    // Keep the selected item inside the bordered viewport.
    let height = tree_area.height.saturating_sub(2) as usize;
    app.sync_selection();
    app.update_scroll(height);
    app.clear_expired_status();

    let visible = app.visible();
    let start = app.scroll_offset.min(visible.len());
    let end = (start + height).min(visible.len());
    let window = &visible[start..end];

    let selected = app.selected_index;
    let rows: Vec<TreeRow<'_>> = app.store.read(|state| {
        window
            .iter()
            .enumerate()
            .map(|(i, node)| TreeRow {
                node,
                expanded: state.is_expanded(&node.id),
                loading: state.is_loading(&node.id),
                selected: start + i == selected,
            })
            .collect()
    });

    let title = app
        .store
        .root()
        .map(|root| format!(" {} ", root.display()))
        .unwrap_or_default();
    let block = Block::default().title(title).borders(Borders::ALL);
    frame.render_widget(TreeWidget::new(&rows, app.use_icons).block(block), tree_area);

    let path = visible
        .get(selected)
        .map(|node| node.id.display().to_string())
        .unwrap_or_default();
    let mut status = StatusBarWidget::new(&path, app.watcher_active);
    if let Some((msg, _)) = &app.status_message {
        status = status.status_message(msg);
    }
    frame.render_widget(status, status_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use ratatui::{backend::TestBackend, Terminal};
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use workspace_tree::fs::{LocalFs, LocalFsOptions};
    use workspace_tree::tree::TreeStore;

    fn line(terminal: &Terminal<TestBackend>, y: u16) -> String {
        let buf = terminal.backend().buffer();
        (0..buf.area.width)
            .map(|x| buf.cell((x, y)).unwrap().symbol().to_string())
            .collect()
    }

    #[tokio::test]
    async fn status_shows_selection_when_viewport_has_no_rows() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::create_dir(dir.path().join("beta")).unwrap();

        let (change_tx, _change_rx) = mpsc::unbounded_channel();
        let options = LocalFsOptions {
            watch: None,
            ..Default::default()
        };
        let store = Arc::new(TreeStore::new(Arc::new(LocalFs::new(options, change_tx))));
        store.load_root(dir.path(), 0).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(store, tx, 0, false);
        app.sync_selection();
        app.select_next();

        // Three lines leave the bordered tree with no inner rows.
        let mut terminal = Terminal::new(TestBackend::new(200, 3)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert!(line(&terminal, 2).contains(&dir.path().join("beta").display().to_string()));
    }
}
